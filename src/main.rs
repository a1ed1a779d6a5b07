mod artifacts;
mod db;
mod error;
mod llm;
mod pipeline;
mod settings;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use artifacts::{
    DifficultyArtifact, LabeledRecord, ScoredRecord, SentencesArtifact, StepCountArtifact,
    StepsOrTexts, TextInput,
};
use db::RawSection;
use pipeline::classify::FallbackClassifier;
use pipeline::gates::{self, Difficulty, QualityVerdict};
use pipeline::lesson::{self, LessonRow};
use pipeline::{Classifier, InfoType, LabeledUnit, SectionOutput, SelectedSet, Template};
use settings::Settings;

#[derive(Parser)]
#[command(name = "lesson_builder", about = "Turn raw teaching text into template-bound lesson steps")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    /// Never call the model for low-confidence classifications
    #[arg(long, global = true)]
    no_llm: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten stored pages into a sections artifact
    Fetch {
        /// Max pages to read (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Split one section into normalized sentences
    Segment {
        #[arg(long)]
        sections: PathBuf,
        #[arg(long)]
        section_id: i64,
        #[arg(long)]
        out: PathBuf,
    },
    /// Classify sentences into info types
    Label {
        #[arg(long = "in")]
        input: PathBuf,
        /// Sections artifact supplying topic keywords
        #[arg(long)]
        sections: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Score labeled sentences
    Score {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        sections: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Keep the first sentence per info type
    Select {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Decide how many steps the selection needs
    Plan {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Bind selected content to templates
    Map {
        #[arg(long = "in")]
        input: PathBuf,
        /// Templates file (default: settings.templates_path)
        #[arg(long)]
        templates: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Restate content in second person via the local model
    Rewrite {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Rate reading difficulty
    Difficulty {
        #[arg(long = "in")]
        input: PathBuf,
        /// Comma-separated domain vocabulary
        #[arg(long, value_delimiter = ',')]
        vocab: Vec<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Check reading grade and token budget
    Quality {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Build lesson rows from mapped steps or rewritten texts
    Rows {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long, default_value = "1")]
        lesson_id: i64,
        #[arg(long, default_value = "Untitled")]
        lesson_title: String,
        /// Style for plain text input
        #[arg(long, default_value = "Definition")]
        section_style: InfoType,
        #[arg(long)]
        out: PathBuf,
        /// Also write the rows to the database
        #[arg(long)]
        persist: bool,
    },
    /// Fetch sections and run the core pipeline on each
    Run {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Write lesson rows to the database
        #[arg(long)]
        persist: bool,
    },
    /// Print effective settings as JSON
    Info,
    /// Validate the templates file
    CheckTemplates {
        #[arg(long)]
        templates: Option<PathBuf>,
    },
    /// Show database counts
    Stats,
}

fn init_tracing(default_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if cli.no_llm {
        settings.classifier_use_llm_fallback = false;
    }
    init_tracing(&settings.log_level, cli.log_json);

    let t0 = Instant::now();

    let result = match cli.command {
        Commands::Fetch { limit, out } => {
            let conn = db::connect(&settings.database_path)?;
            db::init_schema(&conn)?;
            let sections = db::fetch_sections(&conn, limit)?;
            artifacts::write_reported(&out, &sections, &format!("Wrote {} sections", sections.len()))
        }
        Commands::Segment { sections, section_id, out } => {
            let sections: Vec<RawSection> = artifacts::read_json(&sections)?;
            let section = artifacts::find_section(&sections, section_id)?;
            let sentences = pipeline::segment::segment(&section.text);
            let summary = format!("Wrote {} sentences", sentences.len());
            artifacts::write_reported(&out, &SentencesArtifact { section_id, sentences }, &summary)
        }
        Commands::Label { input, sections, out } => {
            let step: SentencesArtifact = artifacts::read_json(&input)?;
            let keywords = section_keywords(sections.as_deref(), step.section_id)?;
            let client = fallback_client(&settings)?;
            let fallback = client.as_ref().map(|c| c as &dyn FallbackClassifier);
            let classifier = Classifier::new(settings.classifier_config(), fallback);
            let records: Vec<LabeledRecord> = classifier
                .classify_all(&step.sentences, keywords.as_ref())
                .into_iter()
                .map(|u| LabeledRecord {
                    section_id: step.section_id,
                    text: u.text,
                    classification: u.classification,
                })
                .collect();
            let summary = format!("Wrote {} labeled sentences", records.len());
            artifacts::write_reported(&out, &records, &summary)
        }
        Commands::Score { input, sections, out } => {
            let labeled: Vec<LabeledRecord> = artifacts::read_json(&input)?;
            let mut records = Vec::with_capacity(labeled.len());
            let mut keywords_for: Option<(i64, Option<HashSet<String>>)> = None;
            for r in labeled {
                if keywords_for.as_ref().map(|(id, _)| *id) != Some(r.section_id) {
                    let kw = section_keywords(sections.as_deref(), r.section_id)?;
                    keywords_for = Some((r.section_id, kw));
                }
                let kw = keywords_for.as_ref().and_then(|(_, k)| k.as_ref());
                let s = pipeline::score::score(&r.text, kw, Some(&r.classification));
                records.push(ScoredRecord {
                    section_id: r.section_id,
                    text: s.text,
                    score: s.score,
                    features: s.features,
                });
            }
            let summary = format!("Wrote {} scored sentences", records.len());
            artifacts::write_reported(&out, &records, &summary)
        }
        Commands::Select { input, out } => {
            let labeled: Vec<LabeledRecord> = artifacts::read_json(&input)?;
            let units: Vec<LabeledUnit> = labeled
                .into_iter()
                .map(|r| LabeledUnit { text: r.text, classification: r.classification })
                .collect();
            let selected = pipeline::select::select_minimal_set(&units);
            let summary = format!("Selected {} info types", selected.non_empty_labels());
            artifacts::write_reported(&out, &selected, &summary)
        }
        Commands::Plan { input, out } => {
            let selected: SelectedSet = artifacts::read_json(&input)?;
            let step_count = pipeline::steps::decide_step_count(&selected);
            let summary = format!("Planned {} step(s)", step_count);
            artifacts::write_reported(&out, &StepCountArtifact { step_count }, &summary)
        }
        Commands::Map { input, templates, out } => {
            let selected: SelectedSet = artifacts::read_json(&input)?;
            let templates = load_templates(&settings, templates.as_deref())?;
            let mapping = pipeline::templates::map_to_templates(&selected, &templates);
            let summary = format!(
                "Mapped {} step(s), {} label(s) without template",
                mapping.steps.len(),
                mapping.skipped.len()
            );
            artifacts::write_reported(&out, &mapping.steps, &summary)
        }
        Commands::Rewrite { input, out } => {
            let lines = artifacts::read_json::<StepsOrTexts>(&input)?.into_lines();
            let client = llm::LlmClient::from_settings(&settings)?;
            let rewritten = lesson::micro_rewrite(&lines, &client, settings.llm_temperature)
                .context("Rewrite failed")?;
            let summary = format!("Rewrote {} line(s)", rewritten.len());
            artifacts::write_reported(&out, &rewritten, &summary)
        }
        Commands::Difficulty { input, vocab, out } => {
            let text = artifacts::read_json::<TextInput>(&input)?.joined();
            let difficulty = gates::determine_difficulty(&text, &vocab);
            let summary = format!("Difficulty {:?}", difficulty);
            artifacts::write_reported(&out, &DifficultyArtifact { difficulty }, &summary)
        }
        Commands::Quality { input, out } => {
            let text = artifacts::read_json::<TextInput>(&input)?.joined();
            let verdict = gates::check_quality(&text, settings.token_cap_per_step);
            let summary = format!("Quality ok={} reason={}", verdict.ok, verdict.reason);
            artifacts::write_reported(&out, &verdict, &summary)
        }
        Commands::Rows { input, lesson_id, lesson_title, section_style, out, persist } => {
            let rows = match artifacts::read_json::<StepsOrTexts>(&input)? {
                StepsOrTexts::Steps(steps) => lesson::rows_from_steps(lesson_id, &lesson_title, &steps),
                StepsOrTexts::Texts(t) => {
                    lesson::rows_from_texts(lesson_id, &lesson_title, section_style, &t.into_lines())
                }
            };
            artifacts::write_reported(&out, &rows, &format!("Wrote {} lesson rows", rows.len()))?;
            if persist {
                let conn = db::connect(&settings.database_path)?;
                db::init_schema(&conn)?;
                let n = db::save_lesson_rows(&conn, &new_run_id(), &rows)?;
                println!("Persisted {} rows.", n);
            }
            Ok(())
        }
        Commands::Run { limit, persist } => run_batch(&settings, limit, persist),
        Commands::Info => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::CheckTemplates { templates } => {
            let templates = load_templates(&settings, templates.as_deref())?;
            let covered: HashSet<InfoType> = templates.iter().map(|t| t.info_type).collect();
            for missing in InfoType::ALL.iter().filter(|t| !covered.contains(*t)) {
                warn!(info_type = %missing, "no template for info type");
            }
            println!("templates OK: {} entries, {}/5 info types covered", templates.len(), covered.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.database_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Pages:   {}", s.pages);
            println!("Steps:   {}", s.steps);
            println!("Lessons: {}", s.lessons);
            println!("Runs:    {}", s.runs);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn fallback_client(settings: &Settings) -> Result<Option<llm::LlmClient>> {
    if !settings.classifier_use_llm_fallback {
        return Ok(None);
    }
    llm::LlmClient::from_settings(settings).map(Some)
}

fn load_templates(settings: &Settings, path: Option<&Path>) -> Result<Vec<Template>> {
    let path = path.unwrap_or(&settings.templates_path);
    pipeline::templates::load_templates(path)
}

/// Keyword vocabulary for a section, when a sections artifact is supplied.
fn section_keywords(sections: Option<&Path>, section_id: i64) -> Result<Option<HashSet<String>>> {
    let Some(path) = sections else {
        return Ok(None);
    };
    let sections: Vec<RawSection> = artifacts::read_json(path)?;
    let section = artifacts::find_section(&sections, section_id)?;
    Ok(Some(pipeline::text::keyword_set(&section.keywords)))
}

fn new_run_id() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

// ── Batch run ──

#[derive(Serialize)]
struct SectionReport<'a> {
    section_id: i64,
    title: Option<&'a str>,
    #[serde(flatten)]
    output: &'a SectionOutput,
    difficulty: Difficulty,
    quality: QualityVerdict,
}

struct RunCounts {
    sections: usize,
    units: usize,
    fallback: usize,
    mapped: usize,
    skipped: usize,
    rows: usize,
}

impl RunCounts {
    fn print(&self) {
        println!(
            "Processed {} sections: {} units ({} via model), {} steps mapped, {} labels skipped, {} rows.",
            self.sections, self.units, self.fallback, self.mapped, self.skipped, self.rows,
        );
    }
}

fn run_batch(settings: &Settings, limit: Option<usize>, persist: bool) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let conn = db::connect(&settings.database_path)?;
    db::init_schema(&conn)?;
    let sections = db::fetch_sections(&conn, limit)?;
    if sections.is_empty() {
        println!("No sections found in {:?}.", settings.database_path);
        return Ok(());
    }
    let templates = load_templates(settings, None)?;
    let client = fallback_client(settings)?;
    let fallback = client.as_ref().map(|c| c as &dyn FallbackClassifier);
    let classifier = Classifier::new(settings.classifier_config(), fallback);
    let run_id = new_run_id();
    info!(run_id = %run_id, sections = sections.len(), "starting run");

    let pb = ProgressBar::new(sections.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = RunCounts { sections: 0, units: 0, fallback: 0, mapped: 0, skipped: 0, rows: 0 };
    let out_dir = settings.output_dir.join(&run_id);

    for chunk in sections.chunks(100) {
        let outputs: Vec<SectionOutput> = chunk
            .par_iter()
            .map(|s| pipeline::process_section(&s.text, &s.keywords, &classifier, &templates))
            .collect();

        let mut rows: Vec<LessonRow> = Vec::new();
        for (section, output) in chunk.iter().zip(&outputs) {
            let title = section.title.as_deref().or(section.page_title.as_deref());
            let step_text: Vec<&str> = output
                .mapped
                .iter()
                .flat_map(|s| s.content.iter().map(String::as_str))
                .collect();
            let step_text = step_text.join("\n");
            let report = SectionReport {
                section_id: section.section_id,
                title,
                output,
                difficulty: gates::determine_difficulty(&step_text, &section.keywords),
                quality: gates::check_quality(&step_text, settings.token_cap_per_step),
            };
            if !report.quality.ok {
                warn!(section_id = section.section_id, reason = %report.quality.reason, "quality gate failed");
            }
            artifacts::write_json(&out_dir.join(format!("section_{}.json", section.section_id)), &report)?;

            counts.sections += 1;
            counts.units += output.units.len();
            counts.fallback += output
                .labeled
                .iter()
                .filter(|l| l.classification.source == pipeline::classify::Source::Fallback)
                .count();
            counts.mapped += output.mapped.len();
            counts.skipped += output.skipped.len();
            rows.extend(lesson::rows_from_steps(
                section.section_id,
                title.unwrap_or("Untitled"),
                &output.mapped,
            ));
        }

        counts.rows += rows.len();
        if persist {
            db::save_lesson_rows(&conn, &run_id, &rows)?;
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    println!("Artifacts -> {:?}", out_dir);
    counts.print();
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
