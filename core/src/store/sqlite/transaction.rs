use super::{opt_timestamp, parse_opt_term, parse_opt_text, parse_text, timestamp, SqliteLedger};
use crate::{
    error::LedgerResult,
    model::{Transaction, TransactionStatus},
    store::TransactionLog,
    types::{to_millis, Timestamp},
};
use rusqlite::{params, OptionalExtension, Row};

const TRANSACTION_COLUMNS: &str = "transaction_id, account_id, investment_id, amount, kind,
    status, plan_name, term_months, destination_address, funding_wallet, created_at, resolved_at";

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        transaction_id: row.get(0)?,
        account_id: row.get(1)?,
        investment_id: row.get(2)?,
        amount: row.get(3)?,
        kind: parse_text(row, 4)?,
        status: parse_text(row, 5)?,
        plan: parse_opt_text(row, 6)?,
        term: parse_opt_term(row, 7)?,
        destination_address: row.get(8)?,
        funding_wallet: row.get(9)?,
        created_at: timestamp(row, 10)?,
        resolved_at: opt_timestamp(row, 11)?,
    })
}

impl TransactionLog for SqliteLedger {
    fn insert_transaction(&self, t: &Transaction) -> LedgerResult<()> {
        self.conn.lock().execute(
            "INSERT INTO ledger_transaction (
                transaction_id, account_id, investment_id, amount, kind, status,
                plan_name, term_months, destination_address, funding_wallet,
                created_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                t.transaction_id,
                t.account_id,
                t.investment_id,
                t.amount,
                t.kind.as_str(),
                t.status.as_str(),
                t.plan.map(|p| p.as_str()),
                t.term.map(|m| m.months()),
                t.destination_address,
                t.funding_wallet,
                to_millis(t.created_at),
                t.resolved_at.map(to_millis),
            ],
        )?;
        Ok(())
    }

    fn transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        let conn = self.conn.lock();
        let t = conn
            .query_row(
                &format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM ledger_transaction WHERE transaction_id = ?1"
                ),
                params![transaction_id],
                transaction_from_row,
            )
            .optional()?;
        Ok(t)
    }

    fn transactions_for(&self, account_id: &str) -> LedgerResult<Vec<Transaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM ledger_transaction
             WHERE account_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![account_id], transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn pending_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM ledger_transaction
             WHERE status = 'pending'
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map([], transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn resolve_transaction(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        resolved_at: Timestamp,
    ) -> LedgerResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE ledger_transaction SET status = ?1, resolved_at = ?2
             WHERE transaction_id = ?3 AND status = 'pending'",
            params![status.as_str(), to_millis(resolved_at), transaction_id],
        )?;
        Ok(changed == 1)
    }
}
