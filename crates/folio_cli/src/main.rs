//! Operator CLI for the folio store.
//!
//! # Responsibility
//! - Provision collections and indexes for a configured store.
//! - Offer read-only lookups (asset resolution, submission stats) for quick
//!   checks against a live store.
//!
//! Store and log settings come from the `FOLIO_*` environment variables.

use folio_core::service::asset_service::{AssetService, RESUME_ASSET_NAME};
use folio_core::{get_handle, provision_site_schema, CollectionNames, SiteServices};
use std::error::Error;
use std::process::ExitCode;

const USAGE: &str = "usage: folio_cli <version | provision | resolve <asset-name> [default] | stats | downloads>";

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = folio_core::init_logging_from_env() {
        eprintln!("logging disabled: {err}");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let command = args.first().map(String::as_str).unwrap_or("version");
    match command {
        "version" => {
            println!("folio_core version={}", folio_core::core_version());
        }
        "provision" => {
            let handle = get_handle()?;
            let names = CollectionNames::from_env();
            let report = provision_site_schema(handle.backend(), &names).await?;
            if report.is_noop() {
                println!("schema already provisioned");
            }
            for collection in &report.created_collections {
                println!("created collection {collection}");
            }
            for (collection, index) in &report.created_indexes {
                println!("created index {index} on {collection}");
            }
        }
        "resolve" => {
            let name = args.get(1).ok_or(USAGE)?;
            let default = args.get(2).map(String::as_str);
            let location = resolve_asset(&services()?.assets, name, default).await?;
            println!("{location}");
        }
        "stats" => {
            let stats = services()?.submissions.stats().await?;
            println!("total={}", stats.total_count);
            println!("last_week={}", stats.last_week_count);
            for referrer in stats.top_referrers {
                println!("referrer {} {}", referrer.host, referrer.count);
            }
        }
        "downloads" => {
            for entry in services()?.downloads.counts_by_asset().await? {
                println!("{} {}", entry.asset_name, entry.count);
            }
        }
        _ => return Err(USAGE.into()),
    }
    Ok(())
}

/// Resolves an asset name to its location.
///
/// With a default, a miss yields the default. `resume` falls back to the
/// standard resume location. Any other miss is an error.
async fn resolve_asset(
    assets: &AssetService,
    name: &str,
    default: Option<&str>,
) -> Result<String, Box<dyn Error>> {
    match default {
        Some(default) => Ok(assets.resolve_location(name, default).await),
        None if name == RESUME_ASSET_NAME => Ok(assets.resolve_resume_location().await),
        None => match assets.find_active_by_name(name).await? {
            Some(item) => Ok(item.fields.url),
            None => Err(format!("no active asset named `{name}`").into()),
        },
    }
}

fn services() -> Result<SiteServices, Box<dyn Error>> {
    let handle = get_handle()?;
    Ok(SiteServices::new(&handle, &CollectionNames::from_env()))
}
