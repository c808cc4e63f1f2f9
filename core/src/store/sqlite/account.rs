use super::{timestamp, SqliteLedger};
use crate::{
    error::{LedgerError, LedgerResult},
    model::Account,
    store::AccountStore,
    types::{to_millis, Money},
};
use rusqlite::{params, OptionalExtension, Row};

const ACCOUNT_COLUMNS: &str = "account_id, display_name, total_realized_profit, created_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        account_id: row.get(0)?,
        display_name: row.get(1)?,
        total_realized_profit: row.get(2)?,
        created_at: timestamp(row, 3)?,
    })
}

impl AccountStore for SqliteLedger {
    fn insert_account(&self, account: &Account) -> LedgerResult<()> {
        self.conn.lock().execute(
            "INSERT INTO account (account_id, display_name, total_realized_profit, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                account.account_id,
                account.display_name,
                account.total_realized_profit,
                to_millis(account.created_at),
            ],
        )?;
        Ok(())
    }

    fn account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        let conn = self.conn.lock();
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE account_id = ?1"),
                params![account_id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    fn accounts(&self) -> LedgerResult<Vec<Account>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map([], account_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn add_realized_profit(&self, account_id: &str, delta: Money) -> LedgerResult<bool> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(LedgerError::validation(format!(
                "realized profit delta {delta} must be non-negative"
            )));
        }
        let changed = self.conn.lock().execute(
            "UPDATE account SET total_realized_profit = total_realized_profit + ?1
             WHERE account_id = ?2",
            params![delta, account_id],
        )?;
        Ok(changed == 1)
    }
}
