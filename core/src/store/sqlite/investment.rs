use super::{parse_term, parse_text, timestamp, SqliteLedger};
use crate::{
    error::LedgerResult,
    model::{Investment, InvestmentStatus},
    store::InvestmentStore,
    types::{to_millis, Money, Timestamp},
};
use rusqlite::{params, OptionalExtension, Row};

const INVESTMENT_COLUMNS: &str = "investment_id, account_id, principal_plus_accrued, plan_name,
    term_months, annual_yield_rate, ceiling_amount, created_at, lock_expires_at,
    last_accrual_at, status, version";

fn investment_from_row(row: &Row<'_>) -> rusqlite::Result<Investment> {
    Ok(Investment {
        investment_id: row.get(0)?,
        account_id: row.get(1)?,
        principal_plus_accrued: row.get(2)?,
        plan: parse_text(row, 3)?,
        term: parse_term(row, 4)?,
        annual_yield_rate: row.get(5)?,
        ceiling_amount: row.get(6)?,
        created_at: timestamp(row, 7)?,
        lock_expires_at: timestamp(row, 8)?,
        last_accrual_at: timestamp(row, 9)?,
        status: parse_text(row, 10)?,
        version: row.get::<_, i64>(11)? as u64,
    })
}

impl SqliteLedger {
    fn query_investments(&self, sql: &str, account_id: Option<&str>) -> LedgerResult<Vec<Investment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = match account_id {
            Some(id) => stmt.query_map(params![id], investment_from_row)?,
            None => stmt.query_map([], investment_from_row)?,
        };
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl InvestmentStore for SqliteLedger {
    fn insert_investment(&self, inv: &Investment) -> LedgerResult<()> {
        self.conn.lock().execute(
            "INSERT INTO investment (
                investment_id, account_id, principal_plus_accrued, plan_name, term_months,
                annual_yield_rate, ceiling_amount, created_at, lock_expires_at,
                last_accrual_at, status, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                inv.investment_id,
                inv.account_id,
                inv.principal_plus_accrued,
                inv.plan.as_str(),
                inv.term.months(),
                inv.annual_yield_rate,
                inv.ceiling_amount,
                to_millis(inv.created_at),
                to_millis(inv.lock_expires_at),
                to_millis(inv.last_accrual_at),
                inv.status.as_str(),
                inv.version as i64,
            ],
        )?;
        Ok(())
    }

    fn investment(&self, investment_id: &str) -> LedgerResult<Option<Investment>> {
        let conn = self.conn.lock();
        let inv = conn
            .query_row(
                &format!("SELECT {INVESTMENT_COLUMNS} FROM investment WHERE investment_id = ?1"),
                params![investment_id],
                investment_from_row,
            )
            .optional()?;
        Ok(inv)
    }

    fn active_investments_for(&self, account_id: &str) -> LedgerResult<Vec<Investment>> {
        self.query_investments(
            &format!(
                "SELECT {INVESTMENT_COLUMNS} FROM investment
                 WHERE account_id = ?1 AND status = 'active'
                 ORDER BY created_at DESC, rowid DESC"
            ),
            Some(account_id),
        )
    }

    fn active_investments(&self) -> LedgerResult<Vec<Investment>> {
        self.query_investments(
            &format!(
                "SELECT {INVESTMENT_COLUMNS} FROM investment
                 WHERE status = 'active'
                 ORDER BY created_at ASC, rowid ASC"
            ),
            None,
        )
    }

    fn increment_position(&self, investment_id: &str, delta: Money) -> LedgerResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE investment
             SET principal_plus_accrued = principal_plus_accrued + ?1, version = version + 1
             WHERE investment_id = ?2 AND status = 'active'",
            params![delta, investment_id],
        )?;
        Ok(changed == 1)
    }

    fn write_position(
        &self,
        investment_id: &str,
        expected_version: u64,
        position: Money,
        status: InvestmentStatus,
    ) -> LedgerResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE investment
             SET principal_plus_accrued = ?1, status = ?2, version = version + 1
             WHERE investment_id = ?3 AND version = ?4 AND status = 'active'",
            params![position, status.as_str(), investment_id, expected_version as i64],
        )?;
        Ok(changed == 1)
    }

    fn record_accrual(
        &self,
        investment_id: &str,
        expected_version: u64,
        profit: Money,
        accrued_at: Timestamp,
        period_start: Timestamp,
    ) -> LedgerResult<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE investment
             SET principal_plus_accrued = principal_plus_accrued + ?1,
                 last_accrual_at = ?2,
                 version = version + 1
             WHERE investment_id = ?3 AND version = ?4 AND status = 'active'
               AND last_accrual_at < ?5",
            params![
                profit,
                to_millis(accrued_at),
                investment_id,
                expected_version as i64,
                to_millis(period_start),
            ],
        )?;
        Ok(changed == 1)
    }
}
