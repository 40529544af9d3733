//! Placeholder rendering for dotfile paths and contents.
//!
//! Dotfile specs may reference per-run facts as `${home}`, `${user}` and
//! `${hostname}`. Rendering is pure string substitution against a
//! [`RunContext`], so file content generation is testable without touching
//! the filesystem.

use thiserror::Error;

use crate::context::RunContext;

/// Errors produced while rendering placeholders.
#[derive(Debug, Error, PartialEq)]
pub enum PlaceholderError {
  /// A `${...}` reference names an unknown placeholder.
  #[error("unknown placeholder: ${{{0}}}")]
  Unknown(String),

  /// A `${` was opened but never closed.
  #[error("unterminated placeholder starting at byte {0}")]
  Unterminated(usize),
}

/// Render all `${...}` placeholders in `input` against the run context.
///
/// A literal `$` not followed by `{` passes through unchanged.
pub fn render(input: &str, ctx: &RunContext) -> Result<String, PlaceholderError> {
  let mut out = String::with_capacity(input.len());
  let mut rest = input;

  while let Some(start) = rest.find("${") {
    out.push_str(&rest[..start]);
    let after = &rest[start + 2..];
    let end = after.find('}').ok_or(PlaceholderError::Unterminated(
      input.len() - rest.len() + start,
    ))?;
    let key = &after[..end];

    match key {
      "home" => out.push_str(&ctx.home),
      "user" => out.push_str(&ctx.user),
      "hostname" => out.push_str(&ctx.hostname),
      other => return Err(PlaceholderError::Unknown(other.to_string())),
    }

    rest = &after[end + 1..];
  }

  out.push_str(rest);
  Ok(out)
}
