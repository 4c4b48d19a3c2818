//! Best-effort desktop notifications.
//!
//! Notifications are sent by handing the message to the platform notifier
//! program (`notify-send` on Linux, `osascript` on macOS). Whether that is
//! allowed is decided once at startup.

use std::cell::RefCell;
use std::io;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

pub trait Notifier {
    fn notify(&self, title: &str, body: &str);
}

impl<N: Notifier + ?Sized> Notifier for Rc<N> {
    fn notify(&self, title: &str, body: &str) {
        (**self).notify(title, body)
    }
}

pub fn task_added(notifier: &dyn Notifier, task: &str) {
    notifier.notify("Task Added", &format!("{} has been added!", task));
}

pub fn task_deleted(notifier: &dyn Notifier, task: &str) {
    notifier.notify("Task Deleted", &format!("{} has been deleted!", task));
}

pub fn deadline_expired(notifier: &dyn Notifier) {
    notifier.notify("Deadline Expired", "A task deadline has expired!");
}

pub struct DesktopNotifier {
    permission: Permission,
    children: RefCell<Vec<Child>>,
}

impl DesktopNotifier {
    /// Resolves permission: notifications must be enabled and the platform
    /// notifier program must be runnable.
    pub fn request(enabled: bool) -> DesktopNotifier {
        let permission = if enabled && notifier_available() {
            Permission::Granted
        } else {
            Permission::Denied
        };
        debug!("Desktop notification permission: {:?}", permission);
        DesktopNotifier {
            permission,
            children: RefCell::new(Vec::new()),
        }
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        if self.permission != Permission::Granted {
            return;
        }

        let (cmd, args) = notifier_command(title, body);
        // The child is running once spawn returns and outlives this process.
        match send(cmd, &args) {
            Ok(child) => {
                let mut children = self.children.borrow_mut();
                children.retain_mut(|child| !finished(child));
                children.push(child);
            }
            Err(e) => debug!("Failed to run notifier '{}': {}", cmd, e),
        }
    }
}

fn send(cmd: &str, args: &[String]) -> io::Result<Child> {
    Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}

/// Reaps `child` if it has exited.
fn finished(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(Some(status)) => {
            if !status.success() {
                debug!("Notifier exited with {:?}", status.code());
            }
            true
        }
        Ok(None) => false,
        Err(e) => {
            debug!("Lost track of notifier process: {}", e);
            true
        }
    }
}

fn notifier_command(title: &str, body: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "macos") {
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            escape_applescript(body),
            escape_applescript(title)
        );
        ("osascript", vec!["-e".to_string(), script])
    } else {
        (
            "notify-send",
            vec![
                "--app-name=tickdown".to_string(),
                title.to_string(),
                body.to_string(),
            ],
        )
    }
}

fn notifier_available() -> bool {
    let (cmd, probe) = if cfg!(target_os = "macos") {
        ("osascript", vec!["-e", "return"])
    } else {
        ("notify-send", vec!["--version"])
    };
    Command::new(cmd)
        .args(&probe)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;

    #[test]
    fn test_event_messages() {
        let notifier = RecordingNotifier::default();
        task_added(&notifier, "Buy milk");
        task_deleted(&notifier, "Buy milk");
        deadline_expired(&notifier);

        assert_eq!(
            *notifier.sent.borrow(),
            vec![
                ("Task Added".to_string(), "Buy milk has been added!".to_string()),
                ("Task Deleted".to_string(), "Buy milk has been deleted!".to_string()),
                (
                    "Deadline Expired".to_string(),
                    "A task deadline has expired!".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_disabled_notifications_are_denied() {
        let notifier = DesktopNotifier::request(false);
        assert_eq!(notifier.permission(), Permission::Denied);
        // Denied notifications are a silent no-op.
        notifier.notify("Task Added", "ignored");
    }

    #[test]
    fn test_applescript_quotes_are_escaped() {
        assert_eq!(escape_applescript(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_send_runs_notifier_in_its_own_process() {
        let temp = tempfile::tempdir().unwrap();
        let marker = temp.path().join("sent");
        let script = format!("touch '{}'", marker.display());

        let mut child = send("sh", &["-c".to_string(), script]).unwrap();

        assert!(child.wait().unwrap().success());
        assert!(marker.exists());
        assert!(finished(&mut child));
    }

    #[test]
    fn test_send_reports_missing_program() {
        assert!(send("tickdown-no-such-notifier", &[]).is_err());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_linux_command_passes_title_and_body() {
        let (cmd, args) = notifier_command("Task Added", "Buy milk has been added!");
        assert_eq!(cmd, "notify-send");
        assert_eq!(&args[1..], ["Task Added", "Buy milk has been added!"]);
    }
}
