//! End-to-end tests for the CLI commands against a local fake API.

mod common;

use inception::cli;
use inception::{
    AuthStatus, Config, CredentialStore, Inception, InceptionArgs, PlainTextRenderer, auth,
};

use common::{FakeApi, TOKEN, answer};

fn setup(api: &FakeApi) -> (tempfile::TempDir, CredentialStore, Config) {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path());
    let args = InceptionArgs {
        base_url: Some(api.base_url.clone()),
        ..InceptionArgs::default()
    };
    let config = Config::resolve(&args, &Default::default(), |_| None);
    (dir, store, config)
}

fn output(buf: Vec<u8>) -> String {
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn login_persists_only_valid_tokens() {
    let api = FakeApi::start().await;
    let (_dir, store, config) = setup(&api);

    let err = auth::login(&store, "wrong", |t| config.client_with_token(t))
        .await
        .unwrap_err();
    assert!(err.is_authentication());
    assert_eq!(auth::status(&store).unwrap(), AuthStatus::LoggedOut);

    auth::login(&store, TOKEN, |t| config.client_with_token(t))
        .await
        .unwrap();
    assert!(auth::status(&store).unwrap().is_logged_in());
    assert_eq!(store.token().unwrap().as_deref(), Some(TOKEN));

    // A later load picks the stored token up.
    let loaded = Config::resolve(
        &InceptionArgs {
            base_url: Some(api.base_url.clone()),
            ..InceptionArgs::default()
        },
        &store.load().unwrap(),
        |_| None,
    );
    assert!(loaded.client().unwrap().list_chats(1).await.is_ok());

    auth::logout(&store).unwrap();
    assert_eq!(auth::status(&store).unwrap(), AuthStatus::LoggedOut);
}

#[tokio::test]
async fn chats_commands() {
    let api = FakeApi::start().await;
    let (_dir, store, config) = setup(&api);
    let client = config.client_with_token(TOKEN.to_string()).unwrap();

    let mut out = Vec::new();
    let first = cli::new_chat(&client, &config.model, "Hello!", &mut out)
        .await
        .unwrap();
    let second = cli::new_chat(&client, &config.model, "Again", &mut out)
        .await
        .unwrap();
    assert_eq!(
        output(out),
        "Created new chat with ID: chat-1\nCreated new chat with ID: chat-2\n"
    );

    let mut out = Vec::new();
    cli::set_default_chat(&client, &store, &second.id, &mut out)
        .await
        .unwrap();
    assert_eq!(output(out), "Set chat-2 as default chat\n");
    assert_eq!(store.default_chat().unwrap().as_deref(), Some("chat-2"));

    let mut out = Vec::new();
    let listed = cli::list_chats(&client, &store, 1, &mut out).await.unwrap();
    assert_eq!(listed.len(), 2);
    let table = output(out);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ID"));
    assert!(lines[1].starts_with("chat-1") && !lines[1].ends_with('*'));
    assert!(lines[2].starts_with("chat-2") && lines[2].ends_with('*'));

    let mut out = Vec::new();
    cli::delete_chat(&client, &store, &first.id, &mut out)
        .await
        .unwrap();
    assert_eq!(store.default_chat().unwrap().as_deref(), Some("chat-2"));

    cli::delete_chat(&client, &store, &second.id, &mut out)
        .await
        .unwrap();
    assert_eq!(store.default_chat().unwrap(), None);

    let err = cli::delete_chat(&client, &store, &second.id, &mut out)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn set_default_requires_existing_chat() {
    let api = FakeApi::start().await;
    let (_dir, store, config) = setup(&api);
    let client = config.client_with_token(TOKEN.to_string()).unwrap();

    let err = cli::set_default_chat(&client, &store, "missing", &mut Vec::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.default_chat().unwrap(), None);
}

#[tokio::test]
async fn input_streams_to_default_chat() {
    let api = FakeApi::start().await;
    let (_dir, store, config) = setup(&api);
    let client = config.client_with_token(TOKEN.to_string()).unwrap();

    let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
    let err = cli::send_input(client.clone(), &store, &config.model, "2+2?", &mut renderer)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no default chat"));

    let (chat_id, created) = cli::ensure_default_chat(&client, &store, &config.model)
        .await
        .unwrap();
    assert!(created);
    assert_eq!(store.default_chat().unwrap(), Some(chat_id.clone()));
    let (again, created) = cli::ensure_default_chat(&client, &store, &config.model)
        .await
        .unwrap();
    assert_eq!(again, chat_id);
    assert!(!created);

    let reply = cli::send_input(client, &store, &config.model, "2+2?", &mut renderer)
        .await
        .unwrap();
    assert_eq!(reply, answer("2+2?"));
    assert_eq!(output(renderer.into_inner()), format!("{}\n", answer("2+2?")));

    let body = api.last_request().json();
    assert_eq!(body["chat_id"], chat_id.as_str());
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn logger_records_interactions() {
    let api = FakeApi::start().await;
    let (dir, store, mut config) = setup(&api);
    let log = dir.path().join("api.jsonl");
    config.log_file = Some(log.clone());
    let client: Inception = config.client_with_token(TOKEN.to_string()).unwrap();

    let (_, _) = cli::ensure_default_chat(&client, &store, &config.model)
        .await
        .unwrap();
    let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
    cli::send_input(client, &store, &config.model, "hi there", &mut renderer)
        .await
        .unwrap();

    let events: Vec<String> = std::fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["event"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(events[0], "chat_created");
    assert_eq!(events[1], "completion_request");
    assert!(events[2..].iter().all(|e| e == "stream_chunk"));
    assert!(events.len() > 3);
}

#[tokio::test]
async fn login_repairs_corrupt_config() {
    let api = FakeApi::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path());
    std::fs::write(store.config_path(), "{not json").unwrap();
    let args = InceptionArgs {
        base_url: Some(api.base_url.clone()),
        ..InceptionArgs::default()
    };
    assert!(Config::load(&args, &store).unwrap_err().is_config());

    let (config, ignored) = Config::load_lenient(&args, &store).unwrap();
    assert!(ignored.is_some());
    auth::login(&store, TOKEN, |t| config.client_with_token(t))
        .await
        .unwrap();

    let config = Config::load(&args, &store).unwrap();
    assert_eq!(config.api_key.as_deref(), Some(TOKEN));
    assert!(config.client().unwrap().list_chats(1).await.is_ok());
}
