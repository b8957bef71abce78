//! Command-line client for the Inception chat API.
//!
//! # Usage
//!
//! ```bash
//! # Store a token (validated against the API first)
//! inception-api auth login
//!
//! # Manage chats
//! inception-api chats new "What is Rust?"
//! inception-api chats list
//! inception-api chats set-default <ID>
//! inception-api chats delete <ID>
//!
//! # Send one message to the default chat
//! inception-api input "What is 2+2?"
//!
//! # Interactive session
//! inception-api chat
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/clear` - Clear conversation history
//! - `/model <name>` - Change the model
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::env;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use inception::chat::{
    ChatCommand, ChatSession, PlainTextRenderer, Renderer, SessionStats, help_text, parse_command,
};
use inception::cli::{self, Command, USAGE};
use inception::client::API_KEY_ENV;
use inception::{AuthStatus, Config, CredentialStore, Error, Inception, InceptionArgs, auth};

/// Main entry point for the inception-api application.
#[tokio::main]
async fn main() -> ExitCode {
    let (args, free) = InceptionArgs::from_command_line_relaxed(USAGE);
    let command = match Command::parse(&free[..]) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("Error: {err}");
            eprintln!("Usage: {USAGE}");
            eprintln!("{}", cli::help_text());
            return ExitCode::from(2);
        }
    };

    match run(args, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: InceptionArgs, command: Command) -> Result<(), Error> {
    let store = CredentialStore::locate(args.config_dir.as_deref())?;
    let config = if command.is_auth() {
        let (config, ignored) = Config::load_lenient(&args, &store)?;
        if let Some(err) = ignored {
            eprintln!("Warning: {err}; ignoring it");
        }
        config
    } else {
        Config::load(&args, &store)?
    };
    let mut stdout = io::stdout();

    match command {
        Command::Help => {
            println!("Usage: {USAGE}");
            println!("{}", cli::help_text());
        }
        Command::AuthLogin => {
            let supplied = args
                .token
                .clone()
                .or_else(|| env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty()));
            let token = match supplied {
                Some(token) => token,
                None => prompt_token()?,
            };
            auth::login(&store, &token, |token| config.client_with_token(token)).await?;
            println!("Successfully logged in!");
        }
        Command::AuthLogout => {
            auth::logout(&store)?;
            println!("Successfully logged out!");
        }
        Command::AuthStatus => {
            let status = auth::status(&store)?;
            println!("{status}");
            if status == AuthStatus::LoggedOut && config.api_key.is_some() {
                println!("A token is supplied by INCEPTION_API_KEY or --token.");
            }
        }
        Command::ChatsNew { message } => {
            let client = config.client()?;
            cli::new_chat(&client, &config.model, &message, &mut stdout).await?;
        }
        Command::ChatsList { page } => {
            let client = config.client()?;
            cli::list_chats(&client, &store, page, &mut stdout).await?;
        }
        Command::ChatsDelete { chat_id } => {
            let client = config.client()?;
            cli::delete_chat(&client, &store, &chat_id, &mut stdout).await?;
        }
        Command::ChatsSetDefault { chat_id } => {
            let client = config.client()?;
            cli::set_default_chat(&client, &store, &chat_id, &mut stdout).await?;
        }
        Command::Input { text } => {
            let client = config.client()?;
            let interrupted = install_interrupt_handler()?;
            let mut renderer =
                PlainTextRenderer::with_color_and_interrupt(config.use_color, interrupted);
            cli::send_input(client, &store, &config.model, &text, &mut renderer).await?;
        }
        Command::Chat => {
            let client = config.client()?;
            let (chat_id, created) = cli::ensure_default_chat(&client, &store, &config.model).await?;
            if created {
                println!("Created new chat with ID: {chat_id}");
            }
            let interrupted = install_interrupt_handler()?;
            let session = ChatSession::new(client, chat_id, config.model.clone());
            interactive(session, config.use_color, interrupted).await?;
        }
    }
    Ok(())
}

fn prompt_token() -> Result<String, Error> {
    let mut rl = DefaultEditor::new()
        .map_err(|err| Error::config(format!("cannot read from terminal: {err}")))?;
    match rl.readline("Enter your API key: ") {
        Ok(line) => Ok(line),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
            Err(Error::abort("login cancelled"))
        }
        Err(err) => Err(Error::config(format!("input error: {err}"))),
    }
}

/// Route Ctrl+C to a flag so a reply can be interrupted without exiting.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>, Error> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })
    .map_err(|err| Error::config(format!("failed to install Ctrl+C handler: {err}")))?;
    Ok(interrupted)
}

async fn interactive(
    mut session: ChatSession<Inception>,
    use_color: bool,
    interrupted: Arc<AtomicBool>,
) -> Result<(), Error> {
    let mut renderer = PlainTextRenderer::with_color_and_interrupt(use_color, interrupted.clone());
    let mut rl = DefaultEditor::new()
        .map_err(|err| Error::config(format!("cannot read from terminal: {err}")))?;

    println!(
        "Starting interactive chat session (chat: {}, model: {})",
        session.chat_id(),
        session.model()
    );
    println!("Type /help for commands, /quit or Ctrl+C to exit\n");

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        match rl.readline("You: ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => break,
                        ChatCommand::Clear => {
                            session.clear();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Model(model) => {
                            renderer.print_info(&format!("Model changed to: {}", model));
                            session.set_model(model);
                        }
                        ChatCommand::Stats => print_stats(&session.stats()),
                        ChatCommand::Invalid(message) => renderer.print_error(&message),
                    }
                    continue;
                }

                // Regular message - send to API
                println!("Assistant:");
                match session.send_streaming(line, &mut renderer).await {
                    Ok(_) => {}
                    Err(err) if err.is_abort() => {}
                    Err(err) => renderer.print_error(&err.to_string()),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    println!("Exiting chat session");
    Ok(())
}

fn print_stats(stats: &SessionStats) {
    println!("    Session Statistics:");
    println!("      Chat: {}", stats.chat_id);
    println!("      Session: {}", stats.session_id);
    println!("      Model: {}", stats.model);
    println!("      Messages: {}", stats.message_count);
    println!(
        "      Total tokens: {} in / {} out ({} replies)",
        stats.total_prompt_tokens, stats.total_completion_tokens, stats.total_requests
    );
    match stats.last_turn_usage {
        Some(usage) => println!(
            "      Last turn tokens: {} in / {} out",
            usage.prompt_tokens, usage.completion_tokens
        ),
        None => println!("      Last turn tokens: (not reported)"),
    }
}
