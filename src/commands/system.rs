use colored::Colorize;

use super::{Command, CommandFlow};

pub fn handle_command(command: &Command) -> Result<CommandFlow, String> {
    match command {
        Command::Help => {
            println!("\n🧪 RAG Auto-Evaluator Commands:");
            println!("  Just type a question to ask the uploaded document");
            println!();

            println!("📄 Document Commands:");
            println!("  upload <file.pdf>   - Save, split and index a PDF");
            println!("  ask <question>      - Answer a question from the document");
            println!("  eval [file.csv]     - Generate a quiz, answer and grade it");
            println!("  runs                - Show recent evaluation runs");
            println!();

            println!("⚙️ Settings Commands:");
            println!("  settings            - Show current settings and choices");
            println!("  set <key> <value>   - Change a setting");
            println!("  Example: set chunk_size 1500, set retriever SVM");
            println!();

            println!("🔧 System Commands:");
            println!("  help  - Show this help menu");
            println!("  exit  - Exit the program");
            println!();
            Ok(CommandFlow::Continue)
        }
        Command::Exit => {
            println!("{}", "👋 Goodbye!".bright_cyan());
            Ok(CommandFlow::Exit)
        }
        _ => Err("Unknown system command. Type 'help' for available commands.".to_string()),
    }
}
