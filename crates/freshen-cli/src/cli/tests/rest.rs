//! Tests for status, reset and list subcommands.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_status() {
    assert!(matches!(parse(&["freshen", "status"]), CliCommand::Status));
}

#[test]
fn cli_parse_reset() {
    match parse(&["freshen", "reset", "--loader", "source"]) {
        CliCommand::Reset { loaders } => assert_eq!(loaders, vec!["source"]),
        _ => panic!("expected Reset"),
    }
    match parse(&["freshen", "reset"]) {
        CliCommand::Reset { loaders } => assert!(loaders.is_empty()),
        _ => panic!("expected Reset"),
    }
}

#[test]
fn cli_parse_list() {
    match parse(&["freshen", "list", "ui"]) {
        CliCommand::List { loader } => assert_eq!(loader, "ui"),
        _ => panic!("expected List"),
    }
}

#[test]
fn cli_list_requires_loader() {
    assert!(Cli::try_parse_from(["freshen", "list"]).is_err());
}
