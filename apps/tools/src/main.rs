use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use collection_core::{
    attach_drag, preview_for_tiers, OrderedCollectionController, SessionIdentity, StorageGateway,
    ViewLiveness,
};
use shared::domain::{CollectionView, ItemId, OwnerId, Preview, TierListId};
use storage::NewItem;
use tracing::info;

mod config;

use config::{load_settings, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long)]
    database_url: Option<String>,
    /// Owner id the session acts as; only this owner may reorder.
    #[arg(long)]
    session_owner: Option<i64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateOwner {
        handle: String,
    },
    AddItem {
        name: String,
        cover: String,
        #[arg(long)]
        rating: Option<f32>,
        #[arg(long)]
        released: Option<NaiveDate>,
        #[arg(long = "platform")]
        platforms: Vec<String>,
    },
    SeedCollection {
        owner_id: i64,
        item_id: i64,
    },
    Show {
        owner_id: i64,
        #[arg(long)]
        json: bool,
    },
    Move {
        owner_id: i64,
        from: usize,
        to: usize,
    },
    CreateTierList {
        owner_id: i64,
        name: String,
    },
    PlaceInTier {
        tier_list_id: i64,
        tier: u32,
        item_id: i64,
    },
    LabelTier {
        tier_list_id: i64,
        tier: u32,
        label: String,
    },
    Preview {
        tier_list_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(url) = cli.database_url {
        settings.database_url = Some(url);
    }
    if let Some(owner) = cli.session_owner {
        settings.session_owner = Some(owner);
    }

    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    let database_url = settings.database_url();
    let gateway = StorageGateway::initialize(&database_url).await?;
    let store = gateway.storage();
    info!(%database_url, "collection storage ready");

    match cli.command {
        Command::CreateOwner { handle } => {
            let owner_id = store.create_owner(&handle).await?;
            println!("created owner_id={}", owner_id.0);
        }
        Command::AddItem {
            name,
            cover,
            rating,
            released,
            platforms,
        } => {
            let mut item = NewItem::new(name, cover);
            item.rating = rating;
            item.release_date = released;
            item.platforms = platforms;
            let item_id = store.insert_item(&item).await?;
            println!("created item_id={}", item_id.0);
        }
        Command::SeedCollection { owner_id, item_id } => {
            let added = store
                .append_to_collection(OwnerId(owner_id), ItemId(item_id))
                .await?;
            if added {
                println!("collected item_id={item_id} for owner_id={owner_id}");
            } else {
                println!("item_id={item_id} already collected by owner_id={owner_id}");
            }
        }
        Command::Show { owner_id, json } => {
            let controller = OrderedCollectionController::new(
                OwnerId(owner_id),
                gateway.clone(),
                gateway.clone(),
            );
            controller.open(&ViewLiveness::new()).await?;
            print_view(&controller.view().await, json)?;
        }
        Command::Move { owner_id, from, to } => {
            let owner_id = OwnerId(owner_id);
            let session = SessionIdentity {
                owner_id: settings.session_owner.map(OwnerId),
            };
            let Some(gesture) = attach_drag(&session, owner_id) else {
                bail!(
                    "session owner {:?} may not reorder the collection of owner {}",
                    settings.session_owner,
                    owner_id.0
                );
            };

            let controller =
                OrderedCollectionController::new(owner_id, gateway.clone(), gateway.clone());
            controller.open(&ViewLiveness::new()).await?;

            let mut gesture = gesture.begin(from).drag_over(to);
            match controller.commit_gesture(&mut gesture).await? {
                Some(ack) => println!(
                    "moved {from} -> {to} (version {}, {:?})",
                    ack.version, ack.outcome
                ),
                None => println!("nothing to move"),
            }
            print_view(&controller.view().await, false)?;
        }
        Command::CreateTierList { owner_id, name } => {
            let tier_list_id = store.create_tier_list(OwnerId(owner_id), &name).await?;
            println!("created tier_list_id={}", tier_list_id.0);
        }
        Command::PlaceInTier {
            tier_list_id,
            tier,
            item_id,
        } => {
            store
                .place_in_tier(TierListId(tier_list_id), tier, ItemId(item_id))
                .await?;
            println!("placed item_id={item_id} in tier {tier}");
        }
        Command::LabelTier {
            tier_list_id,
            tier,
            label,
        } => {
            store.label_tier(TierListId(tier_list_id), tier, &label).await?;
            println!("labelled tier {tier} as '{label}'");
        }
        Command::Preview { tier_list_id } => {
            let tier_list = store
                .load_tier_list(TierListId(tier_list_id))
                .await?
                .with_context(|| format!("no tier list {tier_list_id}"))?;
            let preview = preview_for_tiers(tier_list.tiers);
            if preview == Preview::NoPreview {
                info!(tier_list_id, "tier list has no ranked items");
            }
            println!("{}", serde_json::to_string(&preview)?);
        }
    }

    Ok(())
}

fn print_view(view: &CollectionView, json: bool) -> Result<()> {
    match view {
        CollectionView::Loading => println!("(still loading)"),
        CollectionView::Empty => println!("(empty collection)"),
        CollectionView::Loaded(items) if json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
        CollectionView::Loaded(items) => {
            for (position, item) in items.iter().enumerate() {
                let rating = item
                    .rating
                    .map(|r| format!("{r:.0}"))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{position:>3}. {} [{}] rating={rating}",
                    item.name,
                    item.cover.as_str()
                );
            }
        }
    }
    Ok(())
}
