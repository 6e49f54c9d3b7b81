use anyhow::{Result, bail};
use serde::Serialize;
use std::process;
use tabled::{Table, Tabled, settings::Style};

use crate::config::generate_token;
use dietsync_core::db::Database;

use super::helpers::print_json;

pub(crate) fn cmd_user_add(db: &Database, user_id: &str, json: bool) -> Result<()> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        bail!("User id must not be empty");
    }

    let token = generate_token();
    db.insert_token(&token, user_id)?;

    if json {
        #[derive(Serialize)]
        struct Issued<'a> {
            user_id: &'a str,
            token: &'a str,
        }
        return print_json(&Issued {
            user_id,
            token: &token,
        });
    }

    println!("Issued token for {user_id}:");
    println!("  {token}");
    eprintln!("This token is shown only once. Pass it to `dietsync login --token`.");
    Ok(())
}

pub(crate) fn cmd_user_list(db: &Database, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct TokenRow {
        #[tabled(rename = "User")]
        user_id: String,
        #[tabled(rename = "Token")]
        token: String,
        #[tabled(rename = "Created")]
        created_at: String,
    }

    let tokens = db.list_tokens()?;

    if json {
        return print_json(&tokens);
    }

    if tokens.is_empty() {
        eprintln!("No tokens issued");
        process::exit(2);
    }

    let rows: Vec<TokenRow> = tokens
        .into_iter()
        .map(|t| TokenRow {
            user_id: t.user_id,
            token: format!("...{}", t.token_hint),
            created_at: t.created_at,
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_user_revoke(db: &Database, user_id: &str, json: bool) -> Result<()> {
    let revoked = db.revoke_tokens(user_id)?;

    if json {
        #[derive(Serialize)]
        struct Revoked<'a> {
            user_id: &'a str,
            revoked: usize,
        }
        return print_json(&Revoked { user_id, revoked });
    }

    if revoked == 0 {
        bail!("No tokens found for '{user_id}'");
    }
    println!("Revoked {revoked} token(s) for {user_id}");
    Ok(())
}
