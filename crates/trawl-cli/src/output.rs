//! Formatters.
//!
//! `plain` prints one line per object, `json` one JSON object per line with
//! a `backend` field. Object ids are printed qualified (`id@backend`) in both.
//! Errors always go to stderr as `Error(<backend>): <message>`.

use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use trawl_backend::{
    Account, BackendError, Document, ErrorKind, Profile, Recipient, Subscription, Transaction,
    Transfer, TransferStatus,
};
use trawl_core::{BackendName, OutputFormat, QualifiedId};

/// Something the formatters can print.
pub trait Render: Serialize {
    /// Line for the plain formatter.
    fn plain(&self, backend: Option<&BackendName>) -> String;
}

fn qualify(id: &str, backend: Option<&BackendName>) -> String {
    match backend {
        Some(backend) => QualifiedId::new(id, backend.clone()).to_string(),
        None => id.to_string(),
    }
}

impl Render for Account {
    fn plain(&self, backend: Option<&BackendName>) -> String {
        let mut line = format!(
            "{:<20} {:<32} {:>12} {}",
            qualify(&self.id, backend),
            self.label,
            self.balance.to_string(),
            self.currency
        );
        if let Some(coming) = self.coming {
            line.push_str(&format!("  (coming {coming})"));
        }
        line
    }
}

impl Render for Transaction {
    fn plain(&self, _backend: Option<&BackendName>) -> String {
        let marker = if self.coming { "*" } else { " " };
        format!("{}{marker} {:>12}  {}", self.date, self.amount.to_string(), self.label)
    }
}

impl Render for Recipient {
    fn plain(&self, backend: Option<&BackendName>) -> String {
        let mut line = format!(
            "{:<20} {:<32} {}",
            qualify(&self.id, backend),
            self.label,
            self.iban.as_deref().unwrap_or("-")
        );
        if !self.enabled {
            line.push_str("  (not yet enabled)");
        }
        line
    }
}

impl Render for Transfer {
    fn plain(&self, backend: Option<&BackendName>) -> String {
        let status = match self.status {
            TransferStatus::Draft => "draft",
            TransferStatus::Pending => "pending",
            TransferStatus::Executed => "executed",
            TransferStatus::Rejected => "rejected",
        };
        let mut line = format!(
            "{} {} from {} to {} \"{}\" {status}",
            qualify(self.id.as_deref().unwrap_or("-"), backend),
            self.amount,
            self.account_id,
            self.recipient_id,
            self.label
        );
        if let Some(date) = self.exec_date {
            line.push_str(&format!(" on {date}"));
        }
        if let Some(fees) = self.fees {
            line.push_str(&format!(" (fees {fees})"));
        }
        line
    }
}

impl Render for Profile {
    fn plain(&self, backend: Option<&BackendName>) -> String {
        let mut line = format!("{} {}", qualify(&self.id, backend), self.name);
        for extra in [&self.email, &self.phone, &self.address].into_iter().flatten() {
            line.push_str(&format!(", {extra}"));
        }
        line
    }
}

impl Render for Subscription {
    fn plain(&self, backend: Option<&BackendName>) -> String {
        match &self.subscriber {
            Some(subscriber) => format!("{} {} ({subscriber})", qualify(&self.id, backend), self.label),
            None => format!("{} {}", qualify(&self.id, backend), self.label),
        }
    }
}

impl Render for Document {
    fn plain(&self, backend: Option<&BackendName>) -> String {
        let date = self.date.map_or_else(|| "-".to_string(), |d| d.to_string());
        format!("{:<24} {date:<10} {} ({})", qualify(&self.id, backend), self.label, self.format)
    }
}

/// Stdout and stderr of one command run.
pub struct Output {
    format: OutputFormat,
    limit: Option<usize>,
    printed: usize,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
}

impl Output {
    pub fn new(format: OutputFormat, limit: Option<usize>, out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self {
            format,
            limit,
            printed: 0,
            out,
            err,
        }
    }

    pub fn stdio(format: OutputFormat, limit: Option<usize>) -> Self {
        Self::new(format, limit, Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// The `-n` limit is reached.
    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.printed >= limit)
    }

    pub fn item<T: Render>(&mut self, backend: Option<&BackendName>, item: &T) -> io::Result<()> {
        if self.is_full() {
            return Ok(());
        }
        match self.format {
            OutputFormat::Plain => writeln!(self.out, "{}", item.plain(backend))?,
            OutputFormat::Json => writeln!(self.out, "{}", json_line(backend, item)?)?,
        }
        self.printed += 1;
        Ok(())
    }

    pub fn items<T: Render>(&mut self, backend: &BackendName, items: &[T]) -> io::Result<()> {
        for item in items {
            self.item(Some(backend), item)?;
        }
        Ok(())
    }

    /// Report a failure, attributed to `backend` when there is one.
    pub fn error(&mut self, backend: Option<&BackendName>, err: &BackendError) -> io::Result<()> {
        let tag = if err.kind() == ErrorKind::Bug { "Bug" } else { "Error" };
        match backend {
            Some(backend) => write!(self.err, "{tag}({backend}): {err}")?,
            None => write!(self.err, "{tag}: {err}")?,
        }
        if let Some(request) = err.interaction() {
            let ids: Vec<&str> = request.fields().iter().map(|f| f.id.as_str()).collect();
            if !ids.is_empty() {
                write!(self.err, " [fields: {}]", ids.join(", "))?;
            }
        }
        writeln!(self.err)
    }

    /// Free text on stderr.
    pub fn note(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.err, "{message}")
    }
}

fn json_line<T: Serialize>(backend: Option<&BackendName>, item: &T) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(item)?;
    if let (Value::Object(map), Some(backend)) = (&mut value, backend) {
        let qualified = match map.get("id") {
            Some(Value::String(id)) => Some(qualify(id, Some(backend))),
            _ => None,
        };
        if let Some(id) = qualified {
            map.insert("id".to_string(), Value::String(id));
        }
        map.insert("backend".to_string(), Value::String(backend.to_string()));
    }
    serde_json::to_string(&value)
}

/// Cloneable in-memory writer.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl Captured {
    pub fn text(&self) -> String {
        let buf = self.0.lock().expect("acquire lock on captured output");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("acquire lock on captured output")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
