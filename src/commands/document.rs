use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::llm::Grade;
use crate::session::EvalSession;

fn spinner(message: &str) -> Result<ProgressBar, String> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .map_err(|e| e.to_string())?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

pub async fn upload(session: &mut EvalSession, file_path: &str) -> Result<(), String> {
    if file_path.is_empty() {
        return Err("Usage: upload <file.pdf>".to_string());
    }

    let path = Path::new(file_path);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("Not a file: {}", file_path))?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", file_path, e))?;

    let pb = spinner(&format!("Indexing {}", name))?;
    let result = session.upload(&name, &bytes).await;
    pb.finish_and_clear();
    let report = result.map_err(|e| e.to_string())?;

    println!("✅ {} uploaded", report.path.display().to_string().bright_yellow());
    println!(
        "📄 Pages: {} | 🧩 Chunks: {} | 🔎 Retriever: {}{}",
        report.pages.to_string().cyan(),
        report.chunks.to_string().cyan(),
        report.retriever.to_string().cyan(),
        if report.index_reused { " (index reused)".dimmed().to_string() } else { String::new() }
    );
    Ok(())
}

pub async fn ask(session: &mut EvalSession, question: &str) -> Result<(), String> {
    let pb = spinner("Thinking")?;
    let result = session.ask(question).await;
    pb.finish_and_clear();
    let answer = result.map_err(|e| e.to_string())?;

    println!("{}", answer.answer.truecolor(255, 236, 179));
    if !answer.sources.is_empty() {
        println!("\n📚 Sources:");
        for source in &answer.sources {
            println!("  • {}", source.to_string().dimmed());
        }
    }
    println!();
    Ok(())
}

pub async fn evaluate(session: &mut EvalSession, csv_path: Option<&str>) -> Result<(), String> {
    let total = session.settings().eval_questions as u64;
    let pb = ProgressBar::new(total);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .map_err(|e| e.to_string())?);
    pb.set_message("Generating questions");
    pb.enable_steady_tick(Duration::from_millis(120));

    let progress = pb.clone();
    let result = session
        .evaluate(move |done, total| {
            progress.set_length(total as u64);
            progress.set_position(done as u64);
            progress.set_message("Grading");
        })
        .await;
    pb.finish_and_clear();
    let (report, run_id) = result.map_err(|e| e.to_string())?;

    println!("\n🧪 Evaluation of {}", report.document.bright_yellow());
    for (i, result) in report.results.iter().enumerate() {
        let grade = match result.grade {
            Grade::Correct => result.grade.to_string().green(),
            Grade::Incorrect => result.grade.to_string().red(),
        };
        println!("\n{} {}", format!("Q{}:", i + 1).bold(), result.question);
        println!("   Expected: {}", result.expected.bright_cyan());
        println!("   Answer:   {}", result.answer.truecolor(255, 236, 179));
        println!("   Grade:    {}", grade);
    }

    println!(
        "\n📊 Score: {}/{} ({:.0}%)",
        report.correct().to_string().cyan(),
        report.results.len().to_string().cyan(),
        report.score() * 100.0
    );
    if let Some(id) = run_id {
        println!("💾 Saved as run #{}", id);
    }

    if let Some(csv_path) = csv_path {
        let file = std::fs::File::create(csv_path)
            .map_err(|e| format!("Failed to create {}: {}", csv_path, e))?;
        report
            .write_csv(file)
            .map_err(|e| format!("Failed to write CSV: {}", e))?;
        println!("📝 Results written to {}", csv_path.bright_yellow());
    }
    println!();
    Ok(())
}

pub async fn runs(session: &EvalSession) -> Result<(), String> {
    let runs = session.recent_runs(10).await.map_err(|e| e.to_string())?;
    if runs.is_empty() {
        println!("No evaluation runs yet. Use 'eval' after uploading a document.");
        return Ok(());
    }

    println!("\n📜 Recent Evaluation Runs:");
    for run in runs {
        let retriever = run.settings
            .get("retriever")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        println!(
            "  #{} {} {} [{}] {}/{}",
            run.id,
            run.created_at.dimmed(),
            run.document.bright_yellow(),
            retriever.cyan(),
            run.correct.to_string().green(),
            run.total
        );
    }
    println!();
    Ok(())
}
