use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use speaking_practice::cache::AggregationCache;
use speaking_practice::capture::PrerecordedCapture;
use speaking_practice::challenge::{daily_challenge, DailyChallengeCache};
use speaking_practice::client::{ChallengeSource, HttpEvalClient};
use speaking_practice::config::{AppConfig, DEFAULT_PROMPT};
use speaking_practice::db::{self, PgRecordStore};
use speaking_practice::models::{EvalResponse, Persona, PracticeRecord, RangeMode};
use speaking_practice::pipeline::{PipelineState, RecordingPipeline};
use speaking_practice::radar::DEFAULT_RECENT_N;
use speaking_practice::store::{read_csv_records, MemoryRecordStore, RecordStore};
use speaking_practice::{device, logging, report};

#[derive(Parser)]
#[command(name = "practice-coach")]
#[command(about = "Speaking practice evaluation and growth tracking", long_about = None)]
struct Cli {
    /// Overrides PRACTICE_PERSONA
    #[arg(long, global = true, value_enum)]
    persona: Option<Persona>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample practice history
    Seed,
    /// Import practice records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print trend, skill radar and summary for a range
    Growth {
        #[arg(long, value_enum, default_value_t = RangeMode::Last7Days)]
        range: RangeMode,
        #[arg(long, default_value_t = DEFAULT_RECENT_N)]
        recent: usize,
        /// Read records from a CSV export instead of Postgres
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Generate a markdown growth report
    Report {
        #[arg(long, value_enum, default_value_t = RangeMode::Last30Days)]
        range: RangeMode,
        #[arg(long, default_value = "growth-report.md")]
        out: PathBuf,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Evaluate a recorded answer and save the result
    Record {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_PROMPT)]
        prompt: String,
        /// Extra attempts after a failed upload
        #[arg(long, default_value_t = 1)]
        retries: u32,
    },
    /// Evaluate a typed answer and save the result
    EvalText {
        #[arg(long, default_value = DEFAULT_PROMPT)]
        prompt: String,
        #[arg(long)]
        text: String,
    },
    /// Show today's challenge for the persona
    Challenge {
        /// Skip the same-day cache
        #[arg(long)]
        refresh: bool,
    },
    /// List practice scenes for the persona
    Scenes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(persona) = cli.persona {
        config.persona = persona;
    }

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            let inserted = db::seed(&pool).await?;
            println!("Seed data inserted ({inserted} new records).");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} practice records from {}.", csv.display());
        }
        Commands::Growth { range, recent, csv } => {
            let records = load_records(csv.as_deref()).await?;
            let now = Local::now();
            let mut cache = AggregationCache::new(1, recent);
            let snapshot = cache.aggregate(&records, range, &now);

            println!("{} ({} records)", range.title(), records.len());
            println!("{}", snapshot.summary);
            println!();
            println!("Trend:");
            for point in &snapshot.trend {
                match point.value {
                    Some(value) => println!("- {}: {value:.1}", point.label),
                    None => println!("- {}: -", point.label),
                }
            }
            println!();
            println!("Skills (last {recent} scored):");
            for dimension in &snapshot.radar {
                println!("- {}: {:.1}", dimension.title, dimension.value);
            }
        }
        Commands::Report { range, out, csv } => {
            let records = load_records(csv.as_deref()).await?;
            let now = Local::now();
            let mut cache = AggregationCache::default();
            let snapshot = cache.aggregate(&records, range, &now);
            let report = report::build_report(&snapshot, &records, &now);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Record {
            file,
            prompt,
            retries,
        } => {
            let pool = connect().await?;
            let client = Arc::new(eval_client(config)?);
            let mut pipeline = RecordingPipeline::new(
                PrerecordedCapture::new(&file),
                Arc::clone(&client),
                PgRecordStore::new(pool),
            );
            pipeline.set_prompt(prompt);

            pipeline.toggle().await;
            if !matches!(pipeline.state(), PipelineState::Recording) {
                bail!("recording did not start: {}", describe_failure(pipeline.state()));
            }
            pipeline.toggle().await;
            if let PipelineState::Ready { duration, .. } = pipeline.state() {
                info!(duration_ms = duration.as_millis() as u64, "recording ready");
            }

            pipeline.submit();
            pipeline.run_until_settled().await;

            let mut attempts = 0;
            while attempts < retries && retryable(pipeline.state()) {
                attempts += 1;
                info!(attempt = attempts, "retrying upload");
                pipeline.retry();
                pipeline.run_until_settled().await;
            }

            match pipeline.state() {
                PipelineState::Success { response, .. } => {
                    print_evaluation(response);
                    if let Some(audio_url) = &response.audio_url {
                        println!("Audio: {}", client.full_audio_url(audio_url));
                    }
                    match (pipeline.last_saved(), pipeline.save_error()) {
                        (Some(record), _) => println!("Saved practice record {}.", record.id),
                        (None, Some(error)) => println!("Evaluation was not saved: {error}"),
                        (None, None) => println!("Evaluation was not saved; see logs."),
                    }
                }
                other => bail!("evaluation failed: {}", describe_failure(other)),
            }
        }
        Commands::EvalText { prompt, text } => {
            let pool = connect().await?;
            let client = eval_client(config)?;
            let output = client.evaluate_text(&prompt, &text).await?;
            print_evaluation(&output.response);

            let mut record = PracticeRecord::from_evaluation(&output, prompt, None);
            record.user_text.get_or_insert(text);
            let inserted = db::insert_record(&pool, &record).await?;
            if inserted > 0 {
                println!("Saved practice record {}.", record.id);
            } else {
                println!("Practice record already stored; nothing saved.");
            }
        }
        Commands::Challenge { refresh } => {
            let cache = DailyChallengeCache::new(&config.challenge_cache_path);
            let client = eval_client(config)?;
            let persona = client.persona();
            let today = Local::now().date_naive();

            let challenge = if refresh {
                let challenge = client.fetch_daily_challenge(persona).await?;
                cache
                    .save(persona, &challenge, today)
                    .context("failed to cache daily challenge")?;
                challenge
            } else {
                daily_challenge(&client, &cache, persona, today).await?
            };

            println!("{} ({})", challenge.title, challenge.difficulty());
            println!("{}", challenge.prompt);
        }
        Commands::Scenes => {
            let client = eval_client(config)?;
            let scenes = client.fetch_scenes(client.persona()).await?;
            if scenes.is_empty() {
                println!("No scenes available.");
            }
            for scene in &scenes {
                let category = scene.category.as_deref().unwrap_or("General");
                println!("- [{}] {} ({category}): {}", scene.id, scene.title, scene.prompt);
            }
        }
    }

    Ok(())
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_records(csv: Option<&Path>) -> anyhow::Result<Vec<PracticeRecord>> {
    let records = match csv {
        Some(path) => {
            MemoryRecordStore::new(read_csv_records(path)?)
                .query_all()
                .await?
        }
        None => PgRecordStore::new(connect().await?).query_all().await?,
    };
    Ok(records)
}

fn eval_client(config: AppConfig) -> anyhow::Result<HttpEvalClient> {
    let device_id = device::load_or_create(&config.device_id_path).with_context(|| {
        format!(
            "failed to load device id from {}",
            config.device_id_path.display()
        )
    })?;
    info!(base_url = %config.base_url, persona = config.persona.as_str(), "evaluation client ready");
    Ok(HttpEvalClient::new(config, device_id)?)
}

fn retryable(state: &PipelineState) -> bool {
    matches!(state, PipelineState::Failure { retry: Some(_), .. })
}

fn describe_failure(state: &PipelineState) -> String {
    match state {
        PipelineState::Failure { message, .. } => message.clone(),
        other => format!("pipeline stopped in state {}", other.name()),
    }
}

fn print_evaluation(response: &EvalResponse) {
    println!("Overall score {:.1}", response.overall_score());
    println!(
        "- Fluency {:.1} · Completeness {:.1} · Relevance {:.1}",
        response.fluency, response.completeness, response.relevance
    );
    if let Some(count) = response.grammar_issue_count {
        println!("- Grammar issues: {count}");
    }
    for suggestion in response.suggestions.iter().flatten() {
        println!("- Suggestion: {suggestion}");
    }
    if let Some(keywords) = response.missing_keywords.as_ref().filter(|k| !k.is_empty()) {
        println!("- Missing keywords: {}", keywords.join(", "));
    }
}
