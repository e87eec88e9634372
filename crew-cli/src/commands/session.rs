//! Login and logout commands for the stored session file.

use console::style;
use dialoguer::Password;

use crew_core::config::AppConfig;
use crew_core::error::{CrewError, CrewResult};
use crew_socket::{StoredSession, UserProfile};

/// Save a token and profile to the session file.
pub async fn login(config: AppConfig, token: Option<String>, profile: UserProfile) -> CrewResult<()> {
    let token = match token {
        Some(t) => t,
        None => Password::new()
            .with_prompt("Auth token")
            .interact()
            .map_err(|e| CrewError::Internal(e.to_string()))?,
    };
    if token.trim().is_empty() {
        return Err(CrewError::Credentials("auth token must not be empty".into()));
    }

    let store = super::credential_store(&config)?;
    let name = profile.display_name();
    store
        .save(&StoredSession {
            token: Some(token),
            user: Some(profile),
        })
        .await?;

    println!(
        "  {} Logged in as {}. Session saved to {}",
        style("OK").green().bold(),
        if name.is_empty() { "(unnamed user)" } else { name.as_str() },
        store.path().display()
    );
    Ok(())
}

/// Remove the session file.
pub async fn logout(config: AppConfig) -> CrewResult<()> {
    let store = super::credential_store(&config)?;
    if store.clear().await? {
        println!("  {} Logged out.", style("OK").green().bold());
    } else {
        println!("  Not logged in.");
    }
    Ok(())
}
