//! Human-readable output.

use mcphub_core::{Entity, EntityList, JobRecord};
use mcphub_jobs::LogTail;
use mcphub_orchestrator::StatusReport;

pub fn print_entities(entities: &EntityList) {
    let entities: Vec<&Entity> = entities.iter().collect();
    println!("Entities ({}):", entities.len());
    println!(
        "{:<28}  {:<6}  {:<10}  {:<12}  {}",
        "NAME", "KIND", "RUNTIME", "SOURCE", "DESCRIPTION"
    );
    println!("{}", "-".repeat(90));
    for entity in entities {
        println!(
            "{:<28}  {:<6}  {:<10}  {:<12}  {}",
            entity.name,
            entity.kind.to_string(),
            entity.runtime.to_string(),
            entity.source,
            truncate(&entity.description, 40)
        );
    }
}

pub fn print_entity(entity: &Entity) {
    println!("  Name:       {}", entity.name);
    println!("  Kind:       {}", entity.kind);
    println!("  Runtime:    {}", entity.runtime);
    println!("  Status:     {}", entity.status);
    println!("  Source:     {}", entity.source);
    if !entity.description.is_empty() {
        println!("  About:      {}", entity.description);
    }
    if let Some(path) = &entity.path {
        println!("  Path:       {}", path);
    }
    if let Some(image) = &entity.image {
        println!("  Image:      {}", image);
    }
    println!("  Install:    {}", entity.install_spec);
    println!("  Register:   {}", entity.register_spec);
    if let Some(uninstall) = &entity.uninstall_spec {
        println!("  Uninstall:  {}", uninstall);
    }
    if let Some(unregister) = &entity.unregister_spec {
        println!("  Unregister: {}", unregister);
    }
    if !entity.requires.is_empty() {
        println!("  Requires:   {}", entity.requires.join(", "));
    }
    if !entity.cleanup.is_empty() {
        println!("  Cleanup:    {}", entity.cleanup.join(", "));
    }
    if !entity.extra.is_empty() {
        println!("  Extra:");
        for (key, value) in &entity.extra {
            println!("    {}: {}", key, value);
        }
    }
}

pub fn print_statuses(reports: &[StatusReport]) {
    println!("{:<28}  {:<10}  {}", "NAME", "RUNTIME", "STATUS");
    println!("{}", "-".repeat(56));
    for report in reports {
        println!(
            "{:<28}  {:<10}  {}",
            report.name,
            report.runtime.to_string(),
            report.status
        );
    }
}

pub fn print_job(job: &JobRecord) {
    println!("  ID:         {}", job.job_id);
    println!("  Name:       {}", job.name);
    println!("  Status:     {}", job.status);
    println!("  Command:    {}", job.command);
    println!("  Directory:  {}", job.working_directory.display());
    println!("  Output:     {}", job.output_path.display());
    println!("  Submitted:  {}", job.submitted_at.to_rfc3339());
    if let Some(started) = job.started_at {
        println!("  Started:    {}", started.to_rfc3339());
    }
    if let Some(completed) = job.completed_at {
        println!("  Finished:   {}", completed.to_rfc3339());
    }
    if let Some(pid) = job.pid {
        println!("  PID:        {}", pid);
    }
    if let Some(code) = job.exit_code {
        println!("  Exit code:  {}", code);
    }
    if let Some(error) = &job.error {
        println!("  Error:      {}", error);
    }
}

pub fn print_jobs(jobs: &[JobRecord]) {
    println!("Jobs ({}):", jobs.len());
    println!("{:<32}  {:<10}  {:<24}  {}", "ID", "STATUS", "NAME", "SUBMITTED");
    println!("{}", "-".repeat(90));
    for job in jobs {
        println!(
            "{:<32}  {:<10}  {:<24}  {}",
            job.job_id.as_str(),
            job.status.as_str(),
            truncate(&job.name, 24),
            job.submitted_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

pub fn print_log(log: &LogTail) {
    if log.lines.len() < log.total_lines {
        eprintln!("(last {} of {} lines)", log.lines.len(), log.total_lines);
    }
    for line in &log.lines {
        println!("{}", line);
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(3)).collect();
    short.push_str("...");
    short
}
