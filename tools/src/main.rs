//! ledger-runner: hosts the Aureus ledger for an admin console or a daemon.
//!
//! Usage:
//!   ledger-runner --db ledger.db --data-dir ./data
//!   ledger-runner --db ledger.db --ipc-mode --outbox notices.jsonl
//!   ledger-runner --db :memory: --ipc-mode --no-scheduler

use anyhow::Result;
use aureus_core::{
    clock::{LedgerClock, SystemClock},
    config::LedgerConfig,
    error::LedgerError,
    notify::{LogNotifier, Notice, NoticeSink, Notifier, QueuedNotifier},
    request_processor::TransactionRequest,
    schedule::AccrualScheduler,
    store::SqliteLedger,
    Ledger,
};
use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    RegisterAccount { display_name: String },
    Account { account_id: String },
    Accounts,
    Submit { request: TransactionRequest },
    Approve { transaction_id: String },
    Deny { transaction_id: String },
    Investments { account_id: String },
    Transactions { account_id: String },
    Pending,
    Events { entity_id: String },
    RunAccrual,
    Quit,
}

/// Appends every notice as one JSON line, for a mail relay to pick up.
struct OutboxSink {
    file: File,
}

impl NoticeSink for OutboxSink {
    fn deliver(&mut self, notice: &Notice) -> anyhow::Result<()> {
        writeln!(self.file, "{}", serde_json::to_string(notice)?)?;
        self.file.flush()?;
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let no_scheduler = args.iter().any(|a| a == "--no-scheduler");
    let db = parse_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = parse_arg(&args, "--data-dir").unwrap_or("./data");
    let outbox = parse_arg(&args, "--outbox");

    if !ipc_mode {
        println!("Aureus ledger-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!("  outbox:    {}", outbox.unwrap_or("(log only)"));
        println!("  scheduler: {}", if no_scheduler { "off" } else { "on" });
        println!();
    }

    let config = if Path::new(data_dir).join("ledger.json").exists() {
        LedgerConfig::load(data_dir)?
    } else {
        log::warn!("no ledger.json under {data_dir}, using the built-in catalogue");
        LedgerConfig::default()
    };

    let mut notice_worker = None;
    let notifier: Arc<dyn Notifier> = match outbox {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let (queued, worker) = QueuedNotifier::spawn(OutboxSink { file })?;
            notice_worker = Some(worker);
            Arc::new(queued)
        }
        None => Arc::new(LogNotifier),
    };

    let clock: Arc<dyn LedgerClock> = Arc::new(SystemClock);
    let ledger = Arc::new(Ledger::open(db, config, clock.clone(), notifier)?);

    let scheduler = if no_scheduler {
        None
    } else {
        let job_ledger = ledger.clone();
        Some(AccrualScheduler::spawn(*ledger.schedule(), clock, move |now| {
            if let Err(e) = job_ledger.run_accrual_cycle(now) {
                log::error!("accrual cycle at {now} failed: {e}");
            }
        })?)
    };

    if ipc_mode {
        run_ipc_loop(&ledger)?;
    } else {
        println!("running until stdin closes");
        // Daemon mode: the scheduler does the work, stdin only signals shutdown.
        for line in io::stdin().lock().lines() {
            if line?.trim() == "quit" {
                break;
            }
        }
    }

    if let Some(scheduler) = scheduler {
        scheduler.stop();
    }
    drop(ledger);
    if let Some(worker) = notice_worker {
        if worker.join().is_err() {
            log::error!("notice worker panicked");
        }
    }
    Ok(())
}

fn run_ipc_loop(ledger: &Ledger<SqliteLedger>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string(), "retryable": false });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match handle_command(ledger, cmd) {
            Ok(value) => value,
            Err(e) => error_reply(&e),
        };
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(
    ledger: &Ledger<SqliteLedger>,
    cmd: IpcCommand,
) -> Result<serde_json::Value, LedgerError> {
    let value = match cmd {
        IpcCommand::RegisterAccount { display_name } => {
            serde_json::to_value(ledger.register_account(&display_name)?)?
        }
        IpcCommand::Account { account_id } => serde_json::to_value(ledger.account(&account_id)?)?,
        IpcCommand::Accounts => serde_json::to_value(ledger.list_accounts()?)?,
        IpcCommand::Submit { request } => {
            let txn = ledger.submit_transaction(request)?;
            serde_json::json!({ "transaction_id": txn.transaction_id, "transaction": txn })
        }
        IpcCommand::Approve { transaction_id } => {
            let outcome = ledger.approve_transaction(&transaction_id)?;
            serde_json::json!({ "ok": true, "outcome": outcome })
        }
        IpcCommand::Deny { transaction_id } => {
            let txn = ledger.deny_transaction(&transaction_id)?;
            serde_json::json!({ "ok": true, "transaction": txn })
        }
        IpcCommand::Investments { account_id } => {
            serde_json::to_value(ledger.list_active_investments(&account_id)?)?
        }
        IpcCommand::Transactions { account_id } => {
            serde_json::to_value(ledger.list_transactions(&account_id)?)?
        }
        IpcCommand::Pending => serde_json::to_value(ledger.list_pending_transactions()?)?,
        IpcCommand::Events { entity_id } => serde_json::to_value(ledger.events_for(&entity_id)?)?,
        IpcCommand::RunAccrual => serde_json::to_value(ledger.run_accrual_now()?)?,
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn error_reply(e: &LedgerError) -> serde_json::Value {
    serde_json::json!({
        "error": e.to_string(),
        "code": e.code(),
        "retryable": e.is_retryable(),
    })
}

fn parse_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
