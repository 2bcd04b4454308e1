use std::{collections::HashMap, fs, path::PathBuf};

use notification_service::{models::channel::Channel, renderer::TemplateRenderer};
use serde_json::json;
use uuid::Uuid;

/// Set up a throwaway template directory with one template per channel.
fn setup_template_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("notification-templates-{}", Uuid::new_v4()));

    fs::create_dir_all(dir.join("email")).unwrap();
    fs::create_dir_all(dir.join("sms")).unwrap();
    fs::create_dir_all(dir.join("push")).unwrap();

    fs::write(
        dir.join("email/WELCOME.html"),
        "<p>Hello {{name}}, your balance is {{balance}}.</p>",
    )
    .unwrap();
    fs::write(dir.join("sms/OTP.txt"), "Your code is {{code}}").unwrap();
    fs::write(
        dir.join("push/ALERT.json"),
        r#"{"title": "{{title}}", "body": "{{body}}"}"#,
    )
    .unwrap();

    dir
}

/// Test: Variables of every scalar type are substituted
#[tokio::test]
async fn test_render_substitutes_variables() {
    let dir = setup_template_dir();
    let renderer = TemplateRenderer::new(&dir);

    let mut data = HashMap::new();
    data.insert("name".to_string(), json!("Ada"));
    data.insert("balance".to_string(), json!(42.5));

    let rendered = renderer
        .render(Channel::Email, "WELCOME", &data)
        .await
        .unwrap();

    assert_eq!(rendered, "<p>Hello Ada, your balance is 42.5.</p>");

    fs::remove_dir_all(dir).ok();
}

/// Test: An unreplaced placeholder fails the render
#[tokio::test]
async fn test_render_fails_on_missing_variable() {
    let dir = setup_template_dir();
    let renderer = TemplateRenderer::new(&dir);

    let mut data = HashMap::new();
    data.insert("name".to_string(), json!("Ada"));

    let err = renderer
        .render(Channel::Email, "WELCOME", &data)
        .await
        .unwrap_err();

    assert!(
        err.to_string().contains("{{balance}}"),
        "error should name the missing variable: {}",
        err
    );

    fs::remove_dir_all(dir).ok();
}

/// Test: A missing template file fails the render
#[tokio::test]
async fn test_render_fails_on_missing_template() {
    let dir = setup_template_dir();
    let renderer = TemplateRenderer::new(&dir);

    let err = renderer
        .render(Channel::Email, "NO_SUCH_TEMPLATE", &HashMap::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("NO_SUCH_TEMPLATE"));

    fs::remove_dir_all(dir).ok();
}

/// Test: Templates resolve per channel folder and extension
#[tokio::test]
async fn test_template_paths_per_channel() {
    let dir = setup_template_dir();
    let renderer = TemplateRenderer::new(&dir);

    assert!(renderer.template_exists(Channel::Email, "WELCOME").await);
    assert!(renderer.template_exists(Channel::Sms, "OTP").await);
    assert!(renderer.template_exists(Channel::Push, "ALERT").await);
    assert!(!renderer.template_exists(Channel::Whatsapp, "WELCOME").await);
    // Same code, different channel folder
    assert!(!renderer.template_exists(Channel::Sms, "WELCOME").await);

    fs::remove_dir_all(dir).ok();
}

/// Test: Rendered push templates stay valid JSON
#[tokio::test]
async fn test_push_template_renders_to_json() {
    let dir = setup_template_dir();
    let renderer = TemplateRenderer::new(&dir);

    let mut data = HashMap::new();
    data.insert("title".to_string(), json!("Heads up"));
    data.insert("body".to_string(), json!("Something happened"));

    let rendered = renderer.render(Channel::Push, "ALERT", &data).await.unwrap();

    let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(value["title"], "Heads up");
    assert_eq!(value["body"], "Something happened");

    fs::remove_dir_all(dir).ok();
}

/// Test: Objects and arrays are rejected as variable values
#[tokio::test]
async fn test_render_rejects_complex_variables() {
    let dir = setup_template_dir();
    let renderer = TemplateRenderer::new(&dir);

    let mut data = HashMap::new();
    data.insert("code".to_string(), json!({"nested": true}));

    let err = renderer.render(Channel::Sms, "OTP", &data).await.unwrap_err();

    assert!(err.to_string().contains("Unsupported variable type"));

    fs::remove_dir_all(dir).ok();
}
