use futures::StreamExt;
use inception::{CompletionOptions, Inception, Message, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Create a client using the token from the INCEPTION_API_KEY environment variable
    let client = Inception::new(None)?;

    println!("Creating a new chat...");
    let chat = client
        .create_chat("Hello! Let's explore Rust programming.", "lambda.mercury-coder-small")
        .await?;
    println!("Created chat with ID: {}", chat.id);

    let messages = vec![Message::user("What are the key features of Rust?")];
    let mut stream = client
        .chat_completion(messages, CompletionOptions::new().with_chat_id(chat.id.clone()))
        .await?;

    print!("\nBot: ");
    while let Some(chunk) = stream.next().await {
        if let Some(text) = chunk?.content() {
            print!("{text}");
        }
    }
    println!("\n");

    println!("Listing chats:");
    for summary in client.list_chats(1).await?.iter() {
        println!("- Chat {}: {}", summary.id, summary.display_title());
    }

    client.delete_chat(&chat.id).await?;
    println!("\nDeleted chat {}", chat.id);
    Ok(())
}
