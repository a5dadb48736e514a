//! Operator notifications that bypass logging
//!
//! The payment banner goes straight to the controlling terminal so it shows
//! up regardless of the configured log level.

use std::io::Write;

/// Controlling terminal device
#[cfg(unix)]
const TTY_PATH: &str = "/dev/tty";

/// Render the payment-required banner for a checkout URL
pub fn payment_banner(url: &str) -> String {
    let mut banner = String::new();
    banner.push('\n');
    banner.push_str("╔════════════════════════════════════════════════════════════╗\n");
    banner.push_str("║  ⚠️  PAYMENT REQUIRED                                      ║\n");
    banner.push_str("╚════════════════════════════════════════════════════════════╝\n");
    banner.push('\n');
    banner.push_str("The database requires payment to continue provisioning.\n");
    banner.push_str("Please open this URL to complete the Stripe checkout:\n\n");
    banner.push_str(&format!("  {}\n\n", url));
    banner.push_str("Waiting for payment completion...\n");
    banner.push('\n');
    banner
}

/// Write the payment banner to the terminal, if there is one
///
/// Returns whether the banner was written.
pub fn notify_payment_required(url: &str) -> bool {
    let Some(mut tty) = open_tty() else {
        tracing::debug!("no controlling terminal, skipping payment banner");
        return false;
    };

    match tty
        .write_all(payment_banner(url).as_bytes())
        .and_then(|_| tty.flush())
    {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("failed to write payment banner: {}", e);
            false
        }
    }
}

#[cfg(unix)]
fn open_tty() -> Option<std::fs::File> {
    std::fs::OpenOptions::new().write(true).open(TTY_PATH).ok()
}

#[cfg(not(unix))]
fn open_tty() -> Option<std::fs::File> {
    None
}
