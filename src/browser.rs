use std::process::Command;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("no way to open a browser on this platform; set a browser explicitly")]
    Unsupported,
    #[error("failed to launch {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Program and leading arguments used to open `url`
fn launch_command(browser: Option<&str>) -> Result<Vec<String>, BrowserError> {
    if let Some(browser) = browser.filter(|b| !b.is_empty()) {
        return Ok(vec![browser.to_string()]);
    }

    let args: &[&str] = if cfg!(target_os = "macos") {
        &["open", "-g"]
    } else if cfg!(target_os = "windows") {
        &["cmd", "/C", "start", "/B"]
    } else if cfg!(unix) {
        &["xdg-open"]
    } else {
        return Err(BrowserError::Unsupported);
    };
    Ok(args.iter().map(|s| s.to_string()).collect())
}

/// Open `url` in a browser. The browser process is not waited on.
pub fn launch_browser(url: &str, browser: Option<&str>) -> Result<(), BrowserError> {
    let args = launch_command(browser)?;
    let (program, rest) = args.split_first().ok_or(BrowserError::Unsupported)?;

    info!(command = ?args, url, "launching browser");
    match Command::new(program).args(rest).arg(url).spawn() {
        Ok(_) => Ok(()),
        Err(source) => {
            error!(command = %program, error = %source, "failed to launch browser");
            Err(BrowserError::Spawn {
                command: program.clone(),
                source,
            })
        }
    }
}
