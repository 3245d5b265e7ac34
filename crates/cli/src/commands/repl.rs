//! `mathtutor repl` — Interactive tutor session.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use super::session::TutorSession;

const HELP: &str = "\
  Type a question and press Enter. Examples:
    2+2            integral(x^2)        d(sin(x))
    roots(x^2-4)   solve(2*x + 5 = 11, x)
    plot x^2       What is the Pythagorean theorem?

  :load      Load the AI model
  :status    Show the AI model status
  :test-ai   Ask the AI a fixed question, skipping algebra
  :help      Show this help
  :quit      Leave";

#[derive(Debug, PartialEq)]
enum Input<'a> {
    Question(&'a str),
    Load,
    Status,
    TestAi,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        ":load" => Input::Load,
        ":status" => Input::Status,
        ":test-ai" => Input::TestAi,
        ":help" | ":h" | ":?" => Input::Help,
        ":quit" | ":q" | ":exit" | "exit" | "quit" => Input::Quit,
        command if command.starts_with(':') => Input::Unknown(command),
        question => Input::Question(question),
    }
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let session = TutorSession::open()?;

    println!();
    println!("  MathTutor — Interactive Mode");
    println!();
    println!("  Model:   {} ({})", session.config.model.name, session.config.model.backend);
    println!("  Status:  {}", session.status().message);
    println!();
    println!("{HELP}");
    println!();

    if session.config.model.autoload {
        session.load_model().await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match parse_input(&line) {
            Input::Quit => break,
            Input::Load => {
                session.load_model().await;
            }
            Input::Status => println!("  {}", session.status().message),
            Input::TestAi => {
                session.test_ai().await;
            }
            Input::Help => println!("{HELP}"),
            Input::Unknown(command) => eprintln!("  Unknown command {command}, try :help"),
            Input::Question(question) => {
                session.ask(question).await;
            }
        }
        println!();
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_input(":load"), Input::Load);
        assert_eq!(parse_input("  :status "), Input::Status);
        assert_eq!(parse_input(":test-ai"), Input::TestAi);
        assert_eq!(parse_input(":q"), Input::Quit);
        assert_eq!(parse_input("exit"), Input::Quit);
        assert_eq!(parse_input(":frobnicate"), Input::Unknown(":frobnicate"));
    }

    #[test]
    fn everything_else_is_a_question() {
        assert_eq!(parse_input("integral(x^2)"), Input::Question("integral(x^2)"));
        // blank lines reach the tutor, which asks for a question
        assert_eq!(parse_input("   "), Input::Question(""));
    }
}
