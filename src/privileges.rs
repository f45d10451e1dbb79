use anyhow::{Context, Result};
use nix::unistd::{chown, setgid, setuid, User};
use std::path::Path;

/// Switch the process to `username`, handing it the data directory first.
///
/// Must run after the listener is bound so privileged ports still work.
pub fn drop_to_user(username: &str, data_dir: &Path) -> Result<()> {
    let user = User::from_name(username)
        .with_context(|| format!("Failed to look up user {}", username))?
        .with_context(|| format!("No such user: {}", username))?;

    chown(data_dir, Some(user.uid), Some(user.gid))
        .with_context(|| format!("Failed to chown {} to {}", data_dir.display(), username))?;

    #[cfg(target_os = "linux")]
    nix::unistd::setgroups(&[user.gid]).context("Failed to drop supplementary groups")?;

    setgid(user.gid).context("Failed to set group id")?;
    setuid(user.uid).context("Failed to set user id")?;

    tracing::info!("Dropped privileges to {} (uid {}, gid {})", username, user.uid, user.gid);
    Ok(())
}
