use color_eyre::eyre::{eyre, Result};

/// Hashes a password with bcrypt
///
/// bcrypt is deliberately slow, so the work happens on the blocking pool
pub async fn hash(password: &str) -> Result<String> {
    let password = password.to_owned();

    let hashed = tokio::task::spawn_blocking(move || -> Result<String> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| eyre!("Failed to hash password: {}", e))
    })
    .await??;

    Ok(hashed)
}

/// Checks a password against a stored bcrypt hash
///
/// A malformed stored hash is an error, a mismatch is `Ok(false)`
pub async fn verify(password: &str, hashed: &str) -> Result<bool> {
    let password = password.to_owned();
    let hashed = hashed.to_owned();

    let matches = tokio::task::spawn_blocking(move || -> Result<bool> {
        bcrypt::verify(password, &hashed)
            .map_err(|e| eyre!("Failed to verify password: {}", e))
    })
    .await??;

    Ok(matches)
}
