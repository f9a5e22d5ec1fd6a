//! The operator command loop.
//!
//! Maps terminal input onto the network facade:
//!
//! ```text
//! add                    add a new contact
//! list                   list online, reciprocated contacts
//! send <email> <file>    transfer a file to a contact
//! y / n                  answer a pending inbound-transfer prompt
//! exit                   stop the network and quit
//! ```
//!
//! Every failure degrades to a printed message; nothing a peer or the
//! operator does may crash the loop.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use landrop_core::Contact;
use landrop_net::{NetworkOrchestrator, SendFileError};
use regex_lite::Regex;

use crate::session::Session;

/// Practical email shape check; full RFC 5322 pedantry buys nothing here
/// since identity is just string comparison anyway.
pub fn is_valid_email(text: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email regex")
    });
    regex.is_match(text)
}

/// Splits a line into its command word (lowercased) and untouched
/// arguments. File paths stay case-sensitive.
fn parse_line(line: &str) -> (String, Vec<String>) {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("").to_lowercase();
    (command, parts.map(str::to_string).collect())
}

/// The interactive operator loop.
pub struct Repl {
    session: Arc<Session>,
    network: NetworkOrchestrator,
}

impl Repl {
    pub fn new(session: Arc<Session>, network: NetworkOrchestrator) -> Self {
        Self { session, network }
    }

    /// Runs until `exit` or end of input, then stops the network.
    pub fn run(&mut self) {
        println!("Type \"help\" for commands.");
        let stdin = std::io::stdin();
        loop {
            if self.network.is_awaiting_consent() {
                println!("A contact wants to send you a file. Accept (y/n)?");
            }
            print!("landrop> ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                // EOF: treat like exit so Ctrl-D shuts down cleanly.
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("input error: {e}");
                    break;
                }
            }

            let (command, args) = parse_line(&line);
            if !self.execute(&command, &args) {
                break;
            }
        }

        println!("Stopping all network resources...");
        self.network.stop();
        println!("Network resources stopped.");
    }

    /// Executes one command; returns `false` to leave the loop.
    fn execute(&mut self, command: &str, args: &[String]) -> bool {
        match command {
            "" => {}
            "help" => print_help(),
            "add" => self.add_contact(),
            "list" => self.list_contacts(),
            "send" => self.send(args),
            "y" | "n" if self.network.is_awaiting_consent() => {
                let allow = command == "y";
                self.network.resolve_consent(allow);
                if allow {
                    println!("Receiving file...");
                } else {
                    println!("Rejected file.");
                }
            }
            "exit" => return false,
            other => {
                println!("Received unrecognized command: {other}");
                println!("Type \"help\" for commands.");
            }
        }
        true
    }

    fn add_contact(&self) {
        let Some(name) = prompt_line("Enter the contact's name: ") else {
            return;
        };
        let Some(email) = prompt_line("Enter the contact's email: ") else {
            return;
        };
        if !is_valid_email(&email) {
            println!("Please enter a valid email address.");
            return;
        }

        let contact = Contact::new(name, email);
        match self.session.add_contact(contact.clone()) {
            Ok(()) => println!("Contact {contact} added successfully."),
            Err(e) => println!("Unable to add contact: {e}"),
        }
    }

    fn list_contacts(&self) {
        let online: Vec<Contact> = self
            .session
            .contacts_snapshot()
            .iter()
            .filter(|contact| self.network.has_reciprocated(contact))
            .cloned()
            .collect();

        if online.is_empty() {
            println!("No contacts are currently online.");
        } else {
            println!("The following contacts are online:");
            for contact in online {
                println!("* {contact}");
            }
        }
    }

    fn send(&self, args: &[String]) {
        let [email, file_path] = args else {
            println!("Usage: send <contact-email> <file>");
            return;
        };
        if !is_valid_email(email) {
            println!("Please enter a valid email address.");
            return;
        }
        let path = Path::new(file_path);
        if !path.is_file() {
            println!("Unable to find specified file: {file_path}");
            return;
        }

        let Some(contact) = self.session.contacts_snapshot().find_by_email(email).cloned() else {
            println!("Unable to send file: you haven't added {email} as a contact.");
            return;
        };
        if !self.network.has_reciprocated(&contact) {
            println!(
                "Unable to send file: {contact} has not added you as a contact or is not online."
            );
            return;
        }

        match self.network.send_file(&contact, path) {
            Ok(true) => println!("Sent file successfully."),
            Ok(false) => println!("Failed to send file."),
            Err(SendFileError::SourceMissing(path)) => {
                println!("Unable to find specified file: {}", path.display());
            }
        }
    }
}

fn print_help() {
    println!("\"add\"  -> Add a new contact");
    println!("\"list\" -> List all online contacts");
    println!("\"send\" -> Transfer file to contact");
    println!("\"exit\" -> Exit LanDrop");
}

/// Prints a prompt and reads one trimmed line; `None` on EOF or error.
pub fn prompt_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
