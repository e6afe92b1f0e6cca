//! Asking the user for codes, answers and configuration values.

use std::io::{self, BufRead, BufReader, Stdin, Stderr, Write};
use trawl_auth::{Field, InteractionInput};

pub trait Prompter {
    /// Show a message that needs no answer.
    fn notice(&mut self, message: &str) -> io::Result<()>;

    /// Ask every field in turn after showing `message`.
    fn ask(&mut self, message: &str, fields: &[Field]) -> io::Result<InteractionInput>;
}

/// Line based prompter: questions on `output`, answers from `input`.
///
/// Masked fields are read like the others; no terminal echo control is done.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self, field: &Field) -> io::Result<String> {
        loop {
            write!(self.output, "{}", field.label)?;
            if !field.choices.is_empty() {
                write!(self.output, " [{}]", field.choices.join("/"))?;
            }
            write!(self.output, ": ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("no answer for {}", field.id),
                ));
            }

            let answer = line.trim();
            if answer.is_empty() {
                continue;
            }
            if !field.choices.is_empty() && !field.choices.iter().any(|c| c == answer) {
                writeln!(self.output, "Expected one of: {}", field.choices.join(", "))?;
                continue;
            }
            return Ok(answer.to_string());
        }
    }
}

/// Prompter on the terminal; prompts go to stderr so stdout stays parseable.
pub fn terminal() -> LinePrompter<BufReader<Stdin>, Stderr> {
    LinePrompter::new(BufReader::new(io::stdin()), io::stderr())
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn notice(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{message}")?;
        self.output.flush()
    }

    fn ask(&mut self, message: &str, fields: &[Field]) -> io::Result<InteractionInput> {
        if !message.is_empty() {
            writeln!(self.output, "{message}")?;
        }
        let mut input = InteractionInput::new();
        for field in fields {
            let answer = self.read_answer(field)?;
            input.insert(field.id.clone(), answer);
        }
        Ok(input)
    }
}
