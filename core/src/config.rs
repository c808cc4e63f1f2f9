use crate::{
    error::{LedgerError, LedgerResult},
    model::{LockTerm, PlanTier},
    types::Money,
};
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub plan: PlanTier,
    /// Percent per year.
    pub annual_yield_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermConfig {
    pub term: LockTerm,
    /// Inclusive band for a deposit that opens a new investment.
    pub min_amount: Money,
    pub max_amount: Money,
    /// Maximum position size a top-up may grow to.
    pub ceiling_amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualConfig {
    /// Length of one accrual period.
    pub interval_hours: u32,
    /// UTC wall-clock time periods are anchored to, "HH:MM".
    pub run_at: String,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            run_at: "00:00".into(),
        }
    }
}

impl AccrualConfig {
    pub fn interval(&self) -> Duration {
        Duration::hours(i64::from(self.interval_hours))
    }

    pub fn anchor(&self) -> LedgerResult<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at, "%H:%M").map_err(|e| {
            LedgerError::validation(format!("accrual.run_at '{}': {e}", self.run_at))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub plans: Vec<PlanConfig>,
    pub terms: Vec<TermConfig>,
    #[serde(default)]
    pub accrual: AccrualConfig,
    /// When false, ceilings are advisory and top-ups are never rejected for size.
    #[serde(default)]
    pub enforce_top_up_ceiling: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            plans: vec![
                PlanConfig { plan: PlanTier::Silver,  annual_yield_rate: 12.0 },
                PlanConfig { plan: PlanTier::Gold,    annual_yield_rate: 24.0 },
                PlanConfig { plan: PlanTier::Diamond, annual_yield_rate: 40.0 },
            ],
            terms: vec![
                TermConfig { term: LockTerm::Months3,  min_amount: 500.0,  max_amount: 5_000.0,  ceiling_amount: 50_000.0 },
                TermConfig { term: LockTerm::Months6,  min_amount: 1_000.0, max_amount: 10_000.0, ceiling_amount: 50_000.0 },
                TermConfig { term: LockTerm::Months12, min_amount: 5_000.0, max_amount: 50_000.0, ceiling_amount: 50_000.0 },
            ],
            accrual: AccrualConfig::default(),
            enforce_top_up_ceiling: false,
        }
    }
}

impl LedgerConfig {
    /// Load from `<data_dir>/ledger.json`.
    /// In tests, use LedgerConfig::default().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/ledger.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LedgerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        for plan in PlanTier::ALL {
            let cfg = self.plan(plan)?;
            if !cfg.annual_yield_rate.is_finite() || cfg.annual_yield_rate < 0.0 {
                return Err(LedgerError::validation(format!(
                    "{plan}: yield {} must be a non-negative number",
                    cfg.annual_yield_rate
                )));
            }
        }
        for term in LockTerm::ALL {
            let cfg = self.term(term)?;
            if cfg.min_amount <= 0.0 || cfg.min_amount > cfg.max_amount {
                return Err(LedgerError::validation(format!(
                    "{term}: band {}..{} is empty",
                    cfg.min_amount, cfg.max_amount
                )));
            }
            if cfg.ceiling_amount < cfg.max_amount {
                return Err(LedgerError::validation(format!(
                    "{term}: ceiling {} below band maximum {}",
                    cfg.ceiling_amount, cfg.max_amount
                )));
            }
        }
        if self.accrual.interval_hours == 0 {
            return Err(LedgerError::validation("accrual.interval_hours must be positive"));
        }
        self.accrual.anchor()?;
        Ok(())
    }

    pub fn plan(&self, plan: PlanTier) -> LedgerResult<&PlanConfig> {
        self.plans
            .iter()
            .find(|p| p.plan == plan)
            .ok_or_else(|| LedgerError::validation(format!("plan {plan} is not offered")))
    }

    pub fn term(&self, term: LockTerm) -> LedgerResult<&TermConfig> {
        self.terms
            .iter()
            .find(|t| t.term == term)
            .ok_or_else(|| LedgerError::validation(format!("term {term} is not offered")))
    }
}
