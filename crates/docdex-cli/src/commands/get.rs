//! `get` command

use crate::app::GetArgs;
use crate::commands::resolve_source;
use crate::output;
use docdex_core::db::slice_lines;
use docdex_core::error::{DocdexError, Result};
use docdex_core::Engine;
use serde_json::json;

pub async fn run(engine: &Engine, args: GetArgs, json: bool) -> Result<()> {
    let source = resolve_source(engine, &args.library)?;
    let db = engine.open_library(&source)?;

    let document = match (args.doc, args.target.as_deref()) {
        (Some(id), _) => db
            .get_document(id)?
            .ok_or_else(|| DocdexError::DocumentNotFound(id.to_string()))?,
        (None, Some(target)) => db
            .find_document(target)?
            .ok_or_else(|| DocdexError::DocumentNotFound(target.to_string()))?,
        (None, None) => {
            return Err(DocdexError::InvalidSlice(
                "pass --doc ID or a document path/URI".to_string(),
            ))
        }
    };

    let content = db.get_document_content(document.id)?;
    let body = match args.slice.as_deref() {
        Some(slice) => {
            let (start, end) = parse_slice(slice)?;
            slice_lines(&content, start, end)?
        }
        None => content,
    };

    if json {
        output::print_json(
            vec![json!({
                "document_id": document.id,
                "path": document.path,
                "uri": document.uri,
                "title": document.title,
                "version": document.version_label,
                "content": body,
            })],
            json!({ "command": "get", "slice": args.slice }),
        );
    } else {
        println!("{}", body);
    }
    Ok(())
}

fn parse_slice(slice: &str) -> Result<(usize, usize)> {
    let (start, end) = slice
        .split_once(':')
        .ok_or_else(|| DocdexError::InvalidSlice(format!("`{}` is not start:end", slice)))?;
    let start = start
        .parse()
        .map_err(|_| DocdexError::InvalidSlice(format!("bad start line `{}`", start)))?;
    let end = end
        .parse()
        .map_err(|_| DocdexError::InvalidSlice(format!("bad end line `{}`", end)))?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slice() {
        assert_eq!(parse_slice("2:9").unwrap(), (2, 9));
        assert!(parse_slice("2").is_err());
        assert!(parse_slice("a:b").is_err());
    }
}
