use crate::{
    audit::VerificationLog,
    capture::{CaptureController, RegistrationOutcome},
    config::Config,
    error::{FaceGateError, Result},
    store::{normalize_username, EncodingStore},
};
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Register,
    Verify,
    ListUsers,
    DeleteUser,
    ViewLogs,
    Exit,
}

impl MenuChoice {
    pub fn from_input(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Self::Register),
            "2" => Some(Self::Verify),
            "3" => Some(Self::ListUsers),
            "4" => Some(Self::DeleteUser),
            "5" => Some(Self::ViewLogs),
            "6" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Interactive control loop. Every per-selection error is reported to the
/// operator and swallowed; only exit (or stdin closing) ends the loop.
pub fn run(config: &Config) -> Result<()> {
    let store = EncodingStore::open(config)?;
    let log = VerificationLog::open(config)?;

    loop {
        print_menu();
        let Some(line) = read_line("Choose an option: ")? else {
            break;
        };

        let Some(choice) = MenuChoice::from_input(&line) else {
            println!("[ERROR] Invalid choice.");
            continue;
        };

        let outcome = match choice {
            MenuChoice::Register => register(config, &store),
            MenuChoice::Verify => verify(config, &store, &log),
            MenuChoice::ListUsers => list_users(&store),
            MenuChoice::DeleteUser => delete_user(&store),
            MenuChoice::ViewLogs => view_logs(&log),
            MenuChoice::Exit => {
                println!("Exiting.");
                break;
            }
        };

        if let Err(e) = outcome {
            println!("[ERROR] {}", e);
        }
    }

    Ok(())
}

fn print_menu() {
    println!("\n==== FACE VERIFICATION ====");
    println!("1. Register a new user");
    println!("2. Verify a face");
    println!("3. List registered users");
    println!("4. Delete a user");
    println!("5. View verification logs");
    println!("6. Exit");
}

fn register(config: &Config, store: &EncodingStore) -> Result<()> {
    let Some(raw) = read_line("Enter username: ")? else {
        return Ok(());
    };
    let username = normalize_username(&raw)?;

    let mut controller = CaptureController::new(config)?;
    match controller.run_registration(&username, store)? {
        RegistrationOutcome::Captured => {
            println!("[SUCCESS] Face encoding for '{}' saved.", username);
        }
        RegistrationOutcome::Cancelled => {
            println!("[INFO] Capture cancelled.");
        }
    }
    Ok(())
}

fn verify(config: &Config, store: &EncodingStore, log: &VerificationLog) -> Result<()> {
    // Refuse before touching the camera
    let gallery = store.load_all()?;
    if gallery.is_empty() {
        return Err(FaceGateError::NoUsersRegistered);
    }

    let mut controller = CaptureController::new(config)?;
    controller.run_verification(&gallery, log)?;
    println!("[INFO] Verification session ended.");
    Ok(())
}

fn list_users(store: &EncodingStore) -> Result<()> {
    let users = store.list()?;
    if users.is_empty() {
        println!("[INFO] No users registered.");
    } else {
        println!("[INFO] Registered users:");
        for user in users {
            println!(" - {}", user);
        }
    }
    Ok(())
}

fn delete_user(store: &EncodingStore) -> Result<()> {
    let Some(raw) = read_line("Enter username to delete: ")? else {
        return Ok(());
    };
    let username = normalize_username(&raw)?;
    store.delete(&username)?;
    println!("[INFO] Deleted face data for '{}'.", username);
    Ok(())
}

fn view_logs(log: &VerificationLog) -> Result<()> {
    let entries = log.read_all()?;
    if entries.is_empty() {
        println!("[INFO] No logs found.");
        return Ok(());
    }

    println!("[INFO] Face verification logs:");
    for entry in entries {
        println!(
            "{}  {:<16} {:<6} {}",
            entry.timestamp, entry.username, entry.result, entry.note
        );
    }
    Ok(())
}

/// Prompts and reads one line. Returns `None` when stdin has closed.
fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut line = String::new();
    let bytes_read = io::stdin().lock().read_line(&mut line)?;
    if bytes_read == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_choices_parse() {
        assert_eq!(MenuChoice::from_input("1"), Some(MenuChoice::Register));
        assert_eq!(MenuChoice::from_input("2"), Some(MenuChoice::Verify));
        assert_eq!(MenuChoice::from_input("3"), Some(MenuChoice::ListUsers));
        assert_eq!(MenuChoice::from_input("4"), Some(MenuChoice::DeleteUser));
        assert_eq!(MenuChoice::from_input("5"), Some(MenuChoice::ViewLogs));
        assert_eq!(MenuChoice::from_input("6"), Some(MenuChoice::Exit));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(MenuChoice::from_input(" 6 \n"), Some(MenuChoice::Exit));
    }

    #[test]
    fn anything_else_is_invalid() {
        assert_eq!(MenuChoice::from_input("7"), None);
        assert_eq!(MenuChoice::from_input("register"), None);
        assert_eq!(MenuChoice::from_input(""), None);
    }
}
