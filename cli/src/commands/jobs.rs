//! Job subcommands: run, status, answer, interrupt, resume.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use taskweave_core::api::{
    CliError, InterruptReport, JobController, JobEvent, JobOutcome, JobState, JobStatus,
};
use tokio::sync::broadcast;

use super::cli::{AnswerArgs, InterruptArgs, JobIdArgs, ResumeArgs, RunArgs};

pub const EXIT_SUCCEEDED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_AWAITING: i32 = 2;

pub async fn handle_run(args: RunArgs, controller: &JobController) -> Result<i32, CliError> {
    let request = read_request(&args)?;
    let events = controller.subscribe();
    let job_id = controller.submit(request, args.user.clone()).await?;
    eprintln!("job {job_id} submitted");

    if args.detach {
        println!("{job_id}");
        return Ok(EXIT_SUCCEEDED);
    }

    let outcome = follow(controller, &job_id, events).await?;
    if args.json {
        let state = controller.get_status(&job_id).await?;
        print_json(&state)?;
    } else {
        print_outcome(&job_id, &outcome);
    }
    Ok(exit_code_for_outcome(&outcome))
}

pub async fn handle_status(args: JobIdArgs, controller: &JobController) -> Result<i32, CliError> {
    let state = controller.get_status(&args.job_id).await?;
    if args.json {
        print_json(&state)?;
    } else {
        print!("{}", render_status(&state));
    }
    Ok(EXIT_SUCCEEDED)
}

pub async fn handle_answer(args: AnswerArgs, controller: &JobController) -> Result<i32, CliError> {
    let events = controller.subscribe();
    controller
        .answer_clarification(&args.job_id, args.answers)
        .await?;
    eprintln!("job {} resumed", args.job_id);
    if args.detach {
        return Ok(EXIT_SUCCEEDED);
    }
    let outcome = follow(controller, &args.job_id, events).await?;
    print_outcome(&args.job_id, &outcome);
    Ok(exit_code_for_outcome(&outcome))
}

/// A job recorded as running has no executor in this process, so it is
/// resumed first and followed until it stops again.
pub async fn handle_interrupt(
    args: InterruptArgs,
    controller: &JobController,
) -> Result<i32, CliError> {
    let state = controller.get_status(&args.job_id).await?;
    if state.status != JobStatus::Running {
        let report = controller.interrupt(&args.job_id, args.message).await?;
        print_report(&report);
        return Ok(EXIT_SUCCEEDED);
    }

    let events = controller.subscribe();
    controller.resume(&args.job_id).await?;
    let report = controller.interrupt(&args.job_id, args.message).await?;
    print_report(&report);
    let outcome = follow(controller, &args.job_id, events).await?;
    print_outcome(&args.job_id, &outcome);
    Ok(exit_code_for_outcome(&outcome))
}

pub async fn handle_resume(args: ResumeArgs, controller: &JobController) -> Result<i32, CliError> {
    let events = controller.subscribe();
    let state = controller.resume(&args.job_id).await?;
    if let Some(outcome) = JobOutcome::from_state(&state) {
        print_outcome(&args.job_id, &outcome);
        return Ok(exit_code_for_outcome(&outcome));
    }

    eprintln!(
        "job {} resumed at stage {} ({} tasks planned)",
        args.job_id,
        state.stage,
        state.plan.len()
    );
    if args.detach {
        return Ok(EXIT_SUCCEEDED);
    }
    let outcome = follow(controller, &args.job_id, events).await?;
    print_outcome(&args.job_id, &outcome);
    Ok(exit_code_for_outcome(&outcome))
}

pub fn exit_code_for_outcome(outcome: &JobOutcome) -> i32 {
    match outcome {
        JobOutcome::Succeeded { .. } => EXIT_SUCCEEDED,
        JobOutcome::AwaitingClarification { .. } => EXIT_AWAITING,
        JobOutcome::Failed { .. } => EXIT_FAILED,
    }
}

fn read_request(args: &RunArgs) -> Result<String, CliError> {
    let text = match (&args.prompt, &args.prompt_file) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => {
            return Err(CliError::Command(
                "either --prompt or --prompt-file is required".to_string(),
            ))
        }
    };
    let text = text.trim();
    if text.is_empty() {
        return Err(CliError::Command("request text is empty".to_string()));
    }
    Ok(text.to_string())
}

/// Render progress from job events until the job stops running.
async fn follow(
    controller: &JobController,
    job_id: &str,
    mut events: broadcast::Receiver<JobEvent>,
) -> Result<JobOutcome, CliError> {
    let bar = progress_bar();
    let wait = controller.wait(job_id);
    tokio::pin!(wait);

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome?,
            event = events.recv() => match event {
                Ok(event) if event.job_id() == job_id => render_event(&bar, &event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "taskweave.cli", skipped, "progress lagged behind job events");
                }
                Err(broadcast::error::RecvError::Closed) => break (&mut wait).await?,
            },
        }
    };

    bar.finish_and_clear();
    Ok(outcome)
}

fn progress_bar() -> ProgressBar {
    if !atty::is(atty::Stream::Stderr) {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {pos}/{len} tasks {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn render_event(bar: &ProgressBar, event: &JobEvent) {
    match event {
        JobEvent::StageChanged { to, .. } => bar.set_message(format!("stage: {to}")),
        JobEvent::TaskDispatched { task_id, role, .. } => {
            bar.inc_length(1);
            bar.println(format!("  -> task {task_id} ({})", role.as_str()));
        }
        JobEvent::TaskFinished {
            task_id, status, ..
        } => {
            bar.inc(1);
            bar.println(format!("  <- task {task_id} {status:?}"));
        }
        JobEvent::TaskDiscarded { task_id, .. } => {
            bar.inc(1);
            bar.println(format!("  x  task {task_id} discarded"));
        }
        JobEvent::InterruptApplied { summary, .. } => {
            bar.println(format!("  interrupt: {summary}"));
        }
        _ => {}
    }
}

fn render_status(state: &JobState) -> String {
    let mut out = format!(
        "job:    {}\nuser:   {}\nstatus: {}\nstage:  {}\ncost:   {:.2} estimated, {:.2} spent\n",
        state.job_id,
        state.user_id,
        state.status,
        state.stage,
        state.costs.estimated,
        state.costs.current
    );
    if state.self_corrections > 0 {
        out.push_str(&format!("replans: {}\n", state.self_corrections));
    }
    if !state.plan.is_empty() {
        out.push_str("tasks:\n");
        for task in state.plan.tasks() {
            out.push_str(&format!(
                "  {:>3} {:<14} {:<11} {}\n",
                task.id,
                task.role.as_str(),
                format!("{:?}", task.status),
                first_line(&task.goal)
            ));
        }
    }
    if !state.clarification.questions.is_empty() {
        out.push_str("questions:\n");
        for (i, q) in state.clarification.questions.iter().enumerate() {
            out.push_str(&format!("  {}. {q}\n", i + 1));
        }
    }
    if let Some(failure) = &state.failure {
        out.push_str(&format!("failure: [{}] {}\n", failure.code, failure.reason));
    }
    out
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

fn print_outcome(job_id: &str, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Succeeded { deliverable } => {
            eprintln!("job {job_id} succeeded");
            println!("{deliverable}");
        }
        JobOutcome::AwaitingClarification { questions } => {
            eprintln!("job {job_id} needs clarification:");
            for (i, q) in questions.iter().enumerate() {
                eprintln!("  {}. {q}", i + 1);
            }
            eprintln!("answer with: taskweave answer {job_id} <answer>...");
        }
        JobOutcome::Failed {
            reason,
            report,
            failed_tasks,
            cancelled_tasks,
        } => {
            eprintln!("job {job_id} failed: {reason}");
            if !failed_tasks.is_empty() {
                eprintln!("  failed tasks: {failed_tasks:?}");
            }
            if !cancelled_tasks.is_empty() {
                eprintln!("  cancelled tasks: {cancelled_tasks:?}");
            }
            if let Some(report) = report {
                eprintln!("  last validation: {:?}\n{}", report.status, report.details);
            }
        }
    }
}

fn print_report(report: &InterruptReport) {
    let verdict = if report.accepted { "accepted" } else { "rejected" };
    eprintln!("interrupt {verdict}: {}", report.impact_summary);
    if !report.applied.is_empty() || !report.skipped.is_empty() {
        eprintln!(
            "  {} edit(s) applied, {} skipped",
            report.applied.len(),
            report.skipped.len()
        );
    }
    if let Some(stage) = report.restart_stage {
        eprintln!("  restarting at stage {stage}");
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("failed to encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_core::api::{JobState, Stage, ValidationReport};

    #[test]
    fn test_exit_codes() {
        let ok = JobOutcome::Succeeded {
            deliverable: "done".into(),
        };
        let paused = JobOutcome::AwaitingClarification {
            questions: vec!["which db?".into()],
        };
        let failed = JobOutcome::Failed {
            reason: "tests failed".into(),
            report: Some(ValidationReport::failed("1 failing")),
            failed_tasks: vec![2],
            cancelled_tasks: vec![],
        };
        assert_eq!(exit_code_for_outcome(&ok), EXIT_SUCCEEDED);
        assert_eq!(exit_code_for_outcome(&paused), EXIT_AWAITING);
        assert_eq!(exit_code_for_outcome(&failed), EXIT_FAILED);
    }

    #[test]
    fn test_read_request_rejects_blank_prompt() {
        let args = RunArgs {
            prompt: Some("   ".into()),
            prompt_file: None,
            user: "u".into(),
            detach: false,
            json: false,
        };
        assert!(read_request(&args).is_err());

        let args = RunArgs {
            prompt: None,
            prompt_file: None,
            ..args
        };
        assert!(read_request(&args).is_err());
    }

    #[test]
    fn test_render_status_lists_questions() {
        let mut state = JobState::new("job-1", "alice", "build a blog");
        state.status = JobStatus::AwaitingClarification;
        state.stage = Stage::Clarify;
        state.clarification.questions = vec!["Which database?".into()];

        let text = render_status(&state);
        assert!(text.contains("job:    job-1"));
        assert!(text.contains("status: awaiting_clarification"));
        assert!(text.contains("1. Which database?"));
        assert!(!text.contains("tasks:"));
    }
}
