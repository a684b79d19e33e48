//! Interactive terminal chat.
//!
//! Reads one question per line and prints the answer. Every question is
//! answered independently; the transcript exists only on the terminal.
//! Errors are printed and the session continues. `exit`, `quit`, or end of
//! input ends it.

use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::state::ServiceState;

const PROMPT: &str = "you> ";

pub async fn run_chat<R, W>(state: &ServiceState, input: R, out: &mut W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if let Err(reason) = state.readiness().await {
        writeln!(out, "Not ready: {}", reason)?;
    }
    writeln!(out, "Ask a question about your documents (type 'exit' to quit).")?;

    let mut lines = input.lines();
    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match state.answer(question).await {
            Ok(answer) => writeln!(out, "assistant> {}\n", answer)?,
            Err(e) => writeln!(out, "error> {}\n", e)?,
        }
    }
    Ok(())
}
