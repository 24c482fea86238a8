use super::*;
use std::path::PathBuf;

use crate::{
    attach_drag, OrderedCollectionController, SessionIdentity, ViewLiveness, ViewUpdate,
};
use shared::{domain::ViewPhase, error::ErrorCode};
use storage::NewItem;

async fn seeded_gateway(names: &[&str]) -> (Arc<StorageGateway>, OwnerId, Vec<ItemId>) {
    let gateway = StorageGateway::initialize("sqlite::memory:")
        .await
        .expect("gateway");
    let owner = gateway
        .storage()
        .create_owner("player-one")
        .await
        .expect("owner");
    let mut ids = Vec::new();
    for name in names {
        let id = gateway
            .storage()
            .insert_item(&NewItem::new(*name, format!("covers/{name}.webp")))
            .await
            .expect("item");
        gateway
            .storage()
            .append_to_collection(owner, id)
            .await
            .expect("append");
        ids.push(id);
    }
    (gateway, owner, ids)
}

#[test]
fn builds_sqlite_url_inside_data_dir() {
    let url = StorageGateway::sqlite_url_for_data_dir(&PathBuf::from("/var/lib/shelf"));
    assert_eq!(url, "sqlite:///var/lib/shelf/collections.sqlite3");
}

#[tokio::test]
async fn unknown_owner_loads_as_none() {
    let (gateway, _, _) = seeded_gateway(&[]).await;
    assert_eq!(gateway.load(OwnerId(999)).await.expect("load"), None);
}

#[tokio::test]
async fn save_reports_superseded_for_stale_tokens() {
    let (gateway, owner, ids) = seeded_gateway(&["a", "b"]).await;
    let stored = gateway.load(owner).await.expect("load").expect("owner");

    let reversed = vec![ids[1], ids[0]];
    let applied = gateway
        .save(
            owner,
            &reversed,
            WriteToken {
                version: stored.version + 1,
            },
        )
        .await
        .expect("save");
    assert_eq!(applied, SaveOutcome::Applied);

    let stale = gateway
        .save(
            owner,
            &ids,
            WriteToken {
                version: stored.version,
            },
        )
        .await
        .expect("stale save");
    assert_eq!(stale, SaveOutcome::Superseded);
    assert_eq!(
        gateway.load(owner).await.expect("load").expect("owner").item_ids,
        reversed
    );
}

#[tokio::test]
async fn owner_drag_reorder_round_trips_through_sqlite() {
    let (gateway, owner, ids) = seeded_gateway(&["celeste", "tunic", "hades", "inside"]).await;
    let controller = OrderedCollectionController::new(owner, gateway.clone(), gateway.clone());

    let update = controller.open(&ViewLiveness::new()).await.expect("open");
    assert_eq!(update, ViewUpdate::Applied(ViewPhase::Loaded));

    let mut gesture = attach_drag(&SessionIdentity::signed_in(owner), owner)
        .expect("owner may edit")
        .begin(0)
        .drag_over(1)
        .drag_over(3);
    let ack = controller
        .commit_gesture(&mut gesture)
        .await
        .expect("commit")
        .expect("move");
    assert_eq!(ack.outcome, SaveOutcome::Applied);

    let reopened = OrderedCollectionController::new(owner, gateway.clone(), gateway.clone());
    let loaded = reopened.load().await.expect("load");
    assert_eq!(loaded.item_ids(), &[ids[1], ids[2], ids[3], ids[0]]);

    reopened.open(&ViewLiveness::new()).await.expect("reopen");
    let view = reopened.view().await;
    let names: Vec<_> = view
        .items()
        .expect("loaded")
        .iter()
        .map(|item| item.name.as_str())
        .collect();
    assert_eq!(names, ["tunic", "hades", "inside", "celeste"]);
}

#[tokio::test]
async fn deleted_owner_surfaces_not_found() {
    let (gateway, owner, _) = seeded_gateway(&["a"]).await;
    gateway
        .storage()
        .delete_owner(owner)
        .await
        .expect("delete");

    let controller = OrderedCollectionController::new(owner, gateway.clone(), gateway);
    let err = controller.load().await.expect_err("owner gone");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn move_after_concurrent_append_is_retried_without_losing_the_new_item() {
    let (gateway, owner, ids) = seeded_gateway(&["a", "b", "c"]).await;
    let controller = OrderedCollectionController::new(owner, gateway.clone(), gateway.clone());
    controller.open(&ViewLiveness::new()).await.expect("open");

    let added = gateway
        .storage()
        .insert_item(&NewItem::new("d", "covers/d.webp"))
        .await
        .expect("item");
    gateway
        .storage()
        .append_to_collection(owner, added)
        .await
        .expect("append");

    let next = controller.apply_reorder(0, 2).await.expect("reorder");
    let err = controller.persist(&next).await.expect_err("behind store");
    assert_eq!(err.code(), ErrorCode::PersistenceFailure);

    let ack = controller
        .retry_persist()
        .await
        .expect("retry")
        .expect("pending write");
    assert_eq!(ack.outcome, SaveOutcome::Applied);

    let stored = gateway.load(owner).await.expect("load").expect("owner");
    assert_eq!(stored.item_ids, vec![ids[1], ids[2], ids[0], added]);
}
