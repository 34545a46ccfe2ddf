/// Smoke-test for `ChromeLauncher`.
///
/// Launches Chromium, opens <https://example.com>, waits for the page to
/// settle, and checks the rendered markup and control lookup.
///
/// Run with:
///   cargo run -p kyujin-client --example browser_smoke --features browser
use kyujin_client::{ChromeConfig, ChromeLauncher};
use kyujin_core::source::ControlStrategy;
use kyujin_core::traits::{BrowserSession, PageControl, SessionLauncher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching browser…");
    let launcher = ChromeLauncher::new(ChromeConfig::from_env()?);
    let session = launcher.launch().await?;

    let url = "https://example.com";
    println!("Opening {url} …");
    session.navigate(url).await?;
    session.wait_until_ready().await?;
    let html = session.current_markup().await?;

    assert!(
        html.contains("Example Domain"),
        "Expected heading not found in rendered HTML"
    );

    let link = session
        .find_control(&ControlStrategy::XPath("//a[contains(@href, 'iana')]"))
        .await?;
    assert!(
        link.as_ref().is_some_and(|c| c.is_enabled()),
        "Expected an enabled link on the page"
    );
    let missing = session
        .find_control(&ControlStrategy::Css("#does-not-exist"))
        .await?;
    assert!(missing.is_none());

    session.close().await;
    session.close().await;

    println!("OK, got {} bytes of rendered HTML", html.len());
    Ok(())
}
