use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "taskweave", version, about = "Run and steer multi-agent build jobs")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Load configuration from this file instead of the default search path.
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a request and follow the job until it stops.
    Run(RunArgs),
    /// Print the stored state of a job.
    Status(JobIdArgs),
    /// Answer the clarification questions of a paused job.
    Answer(AnswerArgs),
    /// Send a new instruction to a job.
    Interrupt(InterruptArgs),
    /// Rebuild a job from its persisted record and continue it.
    Resume(ResumeArgs),
    /// Serve the job control API over HTTP.
    Serve(ServeArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, group = "input")]
    pub prompt: Option<String>,

    #[arg(long, group = "input")]
    pub prompt_file: Option<String>,

    #[arg(long, default_value = "local")]
    pub user: String,

    /// Return right after submission instead of waiting for the outcome.
    #[arg(long)]
    pub detach: bool,

    /// Print the final job state as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct JobIdArgs {
    pub job_id: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AnswerArgs {
    pub job_id: String,

    /// One answer per question, in order.
    #[arg(required = true)]
    pub answers: Vec<String>,

    #[arg(long)]
    pub detach: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct InterruptArgs {
    pub job_id: String,

    pub message: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ResumeArgs {
    pub job_id: String,

    #[arg(long)]
    pub detach: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Overrides `http_server.host`.
    #[arg(long)]
    pub host: Option<String>,

    /// Overrides `http_server.port`.
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_run_with_prompt() {
        let args = Args::parse_from(["taskweave", "run", "--prompt", "build a todo api"]);
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.prompt.as_deref(), Some("build a todo api"));
                assert_eq!(run.user, "local");
                assert!(!run.detach);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_prompt_and_prompt_file_conflict() {
        let res = Args::try_parse_from([
            "taskweave",
            "run",
            "--prompt",
            "a",
            "--prompt-file",
            "b.txt",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_answer_requires_answers() {
        assert!(Args::try_parse_from(["taskweave", "answer", "job-1"]).is_err());

        let args = Args::parse_from(["taskweave", "answer", "job-1", "postgres", "yes"]);
        match args.command {
            Commands::Answer(answer) => {
                assert_eq!(answer.job_id, "job-1");
                assert_eq!(answer.answers, vec!["postgres", "yes"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_serve_overrides_and_global_config() {
        let args = Args::parse_from(["taskweave", "serve", "--port", "9000", "--config", "x.toml"]);
        assert_eq!(args.config.as_deref(), Some("x.toml"));
        match args.command {
            Commands::Serve(serve) => {
                assert_eq!(serve.port, Some(9000));
                assert!(serve.host.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
