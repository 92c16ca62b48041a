use std::path::PathBuf;

use veriscope_ledger::models::{CheckKind, VOUCHERS};
use veriscope_ledger::report::MailtoTransport;
use veriscope_ledger::services::EvaluationResult;
use veriscope_ledger::{App, AppError, Config, Result};

const USAGE: &str = "\
Usage: veriscope-ledger <command>

  --login <email>                     set the active user
  --logout                            clear the active user
  --record <url|image> <subject> <score>
                                      store a finished evaluation
  --history                           show check history
  --stats                             show history statistics
  --points                            show balance and recent points
  --vouchers                          list redeemable vouchers
  --redeem <points>                   redeem the voucher costing <points>
  --reportable                        list records that can be reported
  --report <record-id> <reason>       compose a report email
  --confirm-report <record-id>        confirm a sent report
  --defer-report <record-id>          keep a report for later
  --clear-history                     delete check history";

#[tokio::main]
async fn main() {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if let Err(e) = run(&args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| AppError::Config(format!("missing <{}>\n\n{}", name, USAGE)))
}

fn parse_id(value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| AppError::Config(format!("invalid record id: {}", value)))
}

async fn run(args: &[String]) -> Result<()> {
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?;
    let app = App::new(&config).await?;

    match command.as_str() {
        "--login" => {
            let identity = app.login(arg(args, 1, "email")?, true).await?;
            println!("Logged in as {}", identity);
        }
        "--logout" => {
            app.logout().await?;
            println!("Logged out");
        }
        "--record" => {
            let kind = CheckKind::parse(arg(args, 1, "url|image")?)
                .ok_or_else(|| AppError::Config("kind must be url or image".to_string()))?;
            let subject = arg(args, 2, "subject")?;
            let score = arg(args, 3, "score")?;
            let result = EvaluationResult::from_score(serde_json::Value::String(score.to_string()));

            let image_source = (kind == CheckKind::Image)
                .then(|| PathBuf::from(subject))
                .filter(|p| p.is_file());
            let outcome = app
                .complete_evaluation(kind, subject, result, image_source.as_deref())
                .await?;

            if !outcome.inserted {
                println!("Not recorded (duplicate within 5 minutes, or not logged in)");
                return Ok(());
            }
            println!(
                "Recorded #{} {:.1}% ({})",
                outcome.record.id,
                outcome.record.reliability_score,
                if outcome.record.is_reliable { "reliable" } else { "unreliable" }
            );
            let earned_today = app.points_summary().await?.earned_today;
            if outcome.credit.granted() > 0 {
                println!("+{}P", outcome.credit.granted());
            }
            if let Some(message) = outcome.credit.limit_message(earned_today) {
                println!("{}", message);
            }
        }
        "--history" => {
            let view = app.view().await?;
            println!("Check history ({})", view.source.label());
            for record in &view.records {
                println!(
                    "  #{:<15} {:<5} {:>5.1}%  {}  {}",
                    record.id,
                    record.kind.as_str(),
                    record.reliability_score,
                    record.checked_at.format("%Y.%m.%d %H:%M"),
                    record.subject_identifier
                );
            }
        }
        "--stats" => {
            let stats = app.stats().await?;
            println!(
                "Total: {}  Reliable: {}  Unreliable: {}",
                stats.total, stats.reliable, stats.unreliable
            );
        }
        "--points" => {
            let summary = app.points_summary().await?;
            println!("Balance: {}P (today {}P from checks)", summary.balance, summary.earned_today);
            for tx in &summary.recent {
                let when = tx
                    .occurred_at()
                    .map(|at| at.format("%Y.%m.%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("  {:+6}P  {:<12} {}", tx.points, tx.category.label(), when);
            }
        }
        "--vouchers" => {
            for voucher in VOUCHERS {
                println!("  {:>6}P  {}", voucher.cost, voucher.name);
            }
        }
        "--redeem" => {
            let cost = arg(args, 1, "points")?
                .parse()
                .map_err(|_| AppError::Config("points must be a number".to_string()))?;
            let balance = app.redeem(cost).await?;
            println!("Redeemed. Balance: {}P", balance);
        }
        "--reportable" => {
            for record in app.reportable().await? {
                println!(
                    "  #{:<15} {:<5} {:>5.1}%  {}",
                    record.id,
                    record.kind.as_str(),
                    record.reliability_score,
                    record.subject_identifier
                );
            }
        }
        "--report" => {
            let record_id = parse_id(arg(args, 1, "record-id")?)?;
            let reason = args[2..].join(" ");
            if reason.trim().is_empty() {
                return Err(AppError::Config(format!("missing <reason>\n\n{}", USAGE)));
            }
            let identity = app.identity().await?.ok_or(AppError::MissingIdentity)?;
            let name = identity
                .as_str()
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string();
            let message = app
                .submit_report(record_id, &name, &reason, &MailtoTransport)
                .await?;
            println!("Report email opened for {}", message.recipient);
            println!("Run --confirm-report {} once it is sent", record_id);
        }
        "--confirm-report" => {
            let receipt = app
                .confirm_report(parse_id(arg(args, 1, "record-id")?)?)
                .await?;
            println!(
                "Report confirmed for #{}, +{}P",
                receipt.record_id, receipt.points_awarded
            );
        }
        "--defer-report" => {
            app.defer_report(parse_id(arg(args, 1, "record-id")?)?)
                .await?;
            println!("Report kept for later");
        }
        "--clear-history" => {
            app.clear_history().await?;
            println!("Check history cleared");
        }
        other => {
            return Err(AppError::Config(format!("unknown option {}\n\n{}", other, USAGE)));
        }
    }

    Ok(())
}
