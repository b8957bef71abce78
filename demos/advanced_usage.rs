use inception::{
    ChatCompletionRequest, CompletionOptions, Inception, Message, Result,
    collect_content,
};

const MODEL: &str = "lambda.mercury-coder-small";

#[tokio::main]
async fn main() -> Result<()> {
    // A custom base URL can be passed here; None uses the hosted API
    let client = Inception::with_options(None, None, None)?;

    println!("Creating chat with custom model...");
    let chat = client
        .create_chat("Let's explore some coding concepts!", MODEL)
        .await?;

    // Replay an earlier exchange so the model answers in context
    let question = Message::user("What is dependency injection?");
    let answer = Message::assistant("Dependency injection is a design pattern...")
        .with_parent_id(question.id.clone());
    let follow_up = Message::user("Can you show a Rust example of dependency injection?")
        .with_parent_id(answer.id.clone());

    let session_id = ChatCompletionRequest::generate_session_id();
    let options = CompletionOptions::new()
        .with_model(MODEL)
        .with_session_id(session_id.clone())
        .with_chat_id(chat.id.clone());

    // Wait for the whole reply instead of printing it as it streams
    let stream = client
        .chat_completion(vec![question, answer, follow_up], options)
        .await?;
    let reply = collect_content(stream).await?;
    println!("Bot: {reply}");

    println!("\nSession ID: {session_id}");
    println!("Chat ID: {}", chat.id);

    println!("\nCleaning up - deleting chat...");
    client.delete_chat(&chat.id).await?;
    println!("Chat deleted successfully!");
    Ok(())
}
