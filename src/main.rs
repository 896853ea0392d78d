mod aggregate;
mod api_types;
mod budget;
mod config;
mod filters;
mod hooks;
mod lexical;
mod llm;
mod load;
mod media;
mod models;
mod orchestrator;
mod out_models;
mod prompts;
mod render;
mod sampler;
mod session;
mod site;
mod survey;
mod viz_export;

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};

use config::{load_config, resolve_config_path, AppConfig};
use hooks::{BackupHook, EmailHook, WebAppClient};
use llm::ChatCompletionsClient;
use media::TalkClient;
use models::Respondent;
use orchestrator::{
    bogota_now, run_ask, run_options, run_report, run_survey, run_video, Deliveries, MentionInput, ReportOptions,
    SurveyOptions,
};
use sampler::SampleParams;

/// Mention Vibes - sentiment summaries of social-listening exports
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to config file (overrides MENTION_VIBES_CONFIG environment variable)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Output directory for generated files
    #[arg(short, long, default_value = "out", global = true)]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// Mentions CSV
    #[arg(short, long)]
    input: PathBuf,

    #[arg(long, default_value_t = ';')]
    delimiter: char,

    /// Cascade filter `Column=value1,value2`, applied in the given order
    #[arg(long = "filter")]
    filters: Vec<String>,
}

impl InputArgs {
    fn to_input(&self) -> Result<MentionInput> {
        Ok(MentionInput { path: self.input.clone(), delimiter: delimiter_byte(self.delimiter)?, filters: self.filters.clone() })
    }
}

#[derive(ClapArgs, Debug)]
struct ReportArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Label column to aggregate by
    #[arg(short, long, default_value = "Fuente")]
    group_by: String,

    /// Representative mentions per label
    #[arg(long, default_value_t = 5)]
    per_group: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// File whose content is prepended to the prompt
    #[arg(long)]
    base_prompt: Option<PathBuf>,

    #[arg(long, default_value = "reporte_menciones")]
    html_prefix: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate, sample and narrate a mentions export
    Report(ReportArgs),
    /// Ask a free-text question about the first rows
    Ask {
        #[command(flatten)]
        input: InputArgs,
        question: String,
        /// Label column shown next to each row
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        base_prompt: Option<PathBuf>,
    },
    /// List the selectable values of a column under the given filters
    Options {
        #[command(flatten)]
        input: InputArgs,
        column: String,
    },
    /// Narrate the report as an avatar video
    Video(ReportArgs),
    /// Diagnostic survey report
    Survey {
        /// Survey sheet (Categoría;Pregunta;Calificación)
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, default_value_t = ';')]
        delimiter: char,
        /// Rating override `<question number>=<1..3>`
        #[arg(long = "answer")]
        answers: Vec<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        monthly_sales: Option<String>,
        /// Accept the data-processing policy
        #[arg(long)]
        consent: bool,
        /// Website to contrast with the diagnostic
        #[arg(long)]
        site: Option<String>,
        #[arg(long, default_value = "diagnostico")]
        html_prefix: String,
    },
}

fn delimiter_byte(c: char) -> Result<u8> {
    u8::try_from(c).map_err(|_| anyhow!("delimiter must be a single ASCII character, got '{}'", c))
}

fn read_optional(path: Option<&PathBuf>) -> Result<Option<String>> {
    path.map(|p| std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display())))
        .transpose()
}

/// Config-backed clients shared by every command that calls a service.
struct App {
    cfg: AppConfig,
    llm: ChatCompletionsClient,
    web_app: Option<WebAppClient>,
}

impl App {
    fn load(cli: Option<&str>) -> Result<Self> {
        let path = resolve_config_path(cli)?;
        debug!("Loading config - path={}", path.display());
        let cfg = load_config(&path)?;
        let llm = ChatCompletionsClient::new(&cfg.llm)?;
        let web_app = cfg.hooks.as_ref().map(WebAppClient::new).transpose()?;
        Ok(Self { cfg, llm, web_app })
    }

    fn deliveries(&self) -> Deliveries<'_> {
        let Some(w) = self.web_app.as_ref() else {
            return Deliveries::default();
        };
        let recipients: &[String] = self.cfg.hooks.as_ref().map(|h| h.email_to.as_slice()).unwrap_or(&[]);
        let (b, m): (&dyn BackupHook, &dyn EmailHook) = (w, w);
        Deliveries {
            backup: Some(b),
            email: if recipients.is_empty() { None } else { Some((m, recipients)) },
        }
    }
}

fn report_options(args: &ReportArgs, output_dir: PathBuf) -> Result<ReportOptions> {
    Ok(ReportOptions {
        input: args.input.to_input()?,
        group_by: args.group_by.clone(),
        sample: SampleParams { per_group: args.per_group, seed: args.seed },
        base_prompt: read_optional(args.base_prompt.as_ref())?,
        output_dir,
        html_prefix: args.html_prefix.clone(),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();

    info!("Starting mention_vibes");
    let args = Args::parse();

    match args.command {
        Command::Options { input, column } => {
            for v in run_options(&input.to_input()?, &column)? {
                println!("{v}");
            }
        }
        Command::Report(r) => {
            let app = App::load(args.config.as_deref())?;
            let opts = report_options(&r, args.output_dir)?;
            let out = run_report(&opts, &app.llm, app.deliveries(), bogota_now()).await?;
            if out.generated {
                println!("{}", out.report.narrative);
            }
            println!("Report written to {}", out.html_path.display());
        }
        Command::Ask { input, question, label, base_prompt } => {
            let app = App::load(args.config.as_deref())?;
            let base = read_optional(base_prompt.as_ref())?;
            if let Some(answer) = run_ask(&input.to_input()?, &app.llm, &question, label.as_deref(), base.as_deref()).await? {
                println!("{answer}");
            }
        }
        Command::Video(r) => {
            let app = App::load(args.config.as_deref())?;
            let media_cfg = app
                .cfg
                .media
                .as_ref()
                .ok_or_else(|| anyhow!("video needs a `media:` section in the config"))?;
            let media = TalkClient::new(media_cfg)?;
            let opts = report_options(&r, args.output_dir)?;
            let out = run_report(&opts, &app.llm, Deliveries::default(), bogota_now()).await?;
            if out.generated {
                if let Some(url) = run_video(&media, &out.report.narrative).await? {
                    println!("Video: {url}");
                }
            }
        }
        Command::Survey {
            input,
            delimiter,
            answers,
            name,
            phone,
            company,
            monthly_sales,
            consent,
            site,
            html_prefix,
        } => {
            let app = App::load(args.config.as_deref())?;
            let mut advisory_cfg = app.cfg.llm.clone();
            if let Some(m) = app.cfg.advisory_model.as_ref() {
                advisory_cfg.model = m.clone();
            }
            let advisor = ChatCompletionsClient::new(&advisory_cfg)?;
            let opts = SurveyOptions {
                path: input,
                delimiter: delimiter_byte(delimiter)?,
                answers,
                respondent: Respondent { name, phone, company, monthly_sales, consent },
                site_url: site,
                output_dir: args.output_dir,
                html_prefix,
            };
            let (report, html_path) = run_survey(&opts, &advisor, app.deliveries(), bogota_now()).await?;
            if let Some(a) = report.analysis.as_deref() {
                println!("{a}");
            }
            if let Some(a) = report.site_analysis.as_deref() {
                println!("\n{a}");
            }
            println!("Report written to {}", html_path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_parses_without_config() {
        let args = Args::try_parse_from(["mention_vibes", "options", "-i", "m.csv", "--filter", "Region=Sur", "Filial"]).unwrap();
        assert!(args.config.is_none());
        match args.command {
            Command::Options { input, column } => {
                assert_eq!(column, "Filial");
                assert_eq!(input.to_input().unwrap().delimiter, b';');
                assert_eq!(input.filters, vec!["Region=Sur"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn survey_flags() {
        let args = Args::try_parse_from([
            "mention_vibes", "survey", "-i", "e.csv", "--consent", "--answer", "1=3", "--company", "ACME",
        ])
        .unwrap();
        let Command::Survey { consent, answers, company, .. } = args.command else {
            panic!("expected survey");
        };
        assert!(consent);
        assert_eq!(answers, vec!["1=3"]);
        assert_eq!(company.as_deref(), Some("ACME"));
    }

    #[test]
    fn delimiter_must_be_one_byte() {
        assert_eq!(delimiter_byte(',').unwrap(), b',');
        assert!(delimiter_byte('€').is_err());
    }
}
