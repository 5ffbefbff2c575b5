//! Invariants du catalogue : révision monotone, pierres tombales, filtrage
//! par types partagés.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::*;

use pmodaap::{DaapId, Entry, ServerBackend};
use pmoconfig::ConfigEvent;
use pmoshareserver::{HostPlaylist, PlaylistKind};
use pmosharing::FileType;

#[test]
fn test_revision_strictly_increases_on_every_mutation() {
    let (_dir, config) = test_config();
    let (catalog, _log) = make_catalog(MockHost::empty(), config);

    let mut revisions = vec![catalog.revision()];

    catalog.item_list(None, vec![host_item(1, "Un", FileType::Audio)]);
    revisions.push(catalog.revision());

    catalog.playlist_added(vec![host_playlist(10, "Rock")], PlaylistKind::Playlist);
    revisions.push(catalog.revision());

    catalog.item_list(Some(10), vec![host_item(1, "Un", FileType::Audio)]);
    revisions.push(catalog.revision());

    catalog.items_changed(None, vec![], vec![], vec![1]);
    revisions.push(catalog.revision());

    catalog.playlist_removed(vec![10]);
    revisions.push(catalog.revision());

    for window in revisions.windows(2) {
        assert!(window[1] > window[0], "revision went {} -> {}", window[0], window[1]);
    }
}

#[test]
fn test_item_list_tombstones_absent_items() {
    let (_dir, config) = test_config();
    let (catalog, _log) = make_catalog(MockHost::empty(), config);

    catalog.item_list(
        None,
        vec![
            host_item(1, "Un", FileType::Audio),
            host_item(2, "Deux", FileType::Audio),
        ],
    );
    let live_revision = catalog.revision();

    // Nouvelle liste complète sans l'item 2
    catalog.item_list(None, vec![host_item(1, "Un", FileType::Audio)]);

    let items = catalog.get_items(None);
    assert!(items[&1].is_live());
    match &items[&2] {
        Entry::Tombstone { revision } => {
            // La pierre tombale date d'après la dernière version vivante
            assert!(*revision >= live_revision);
        }
        Entry::Live(_) => panic!("item 2 should be a tombstone"),
    }
}

#[test]
fn test_items_changed_adjusts_playlist_membership() {
    let (_dir, config) = test_config();
    let (catalog, _log) = make_catalog(MockHost::empty(), config);

    catalog.item_list(
        None,
        vec![
            host_item(1, "Un", FileType::Audio),
            host_item(2, "Deux", FileType::Audio),
        ],
    );
    catalog.playlist_added(vec![host_playlist(10, "Rock")], PlaylistKind::Playlist);
    catalog.item_list(
        Some(10),
        vec![
            host_item(1, "Un", FileType::Audio),
            host_item(2, "Deux", FileType::Audio),
        ],
    );

    // Retrait de l'item 2 de la playlist seulement
    catalog.items_changed(Some(10), vec![], vec![], vec![2]);
    assert_eq!(catalog.playlist_membership(10), vec![1]);
    assert_eq!(catalog.playlist_deleted_items(10), vec![2]);
    // L'item lui-même reste vivant dans la bibliothèque
    assert!(catalog.get_items(None)[&2].is_live());

    // Remis dans la playlist : la suppression est annulée
    catalog.items_changed(Some(10), vec![host_item(2, "Deux", FileType::Audio)], vec![], vec![]);
    assert_eq!(catalog.playlist_membership(10), vec![1, 2]);
    assert!(catalog.playlist_deleted_items(10).is_empty());
}

#[test]
fn test_membership_only_update_bumps_revision() {
    let (_dir, config) = test_config();
    let (catalog, _log) = make_catalog(MockHost::empty(), config);

    catalog.item_list(None, vec![host_item(1, "Un", FileType::Audio)]);
    catalog.playlist_added(vec![host_playlist(10, "Rock")], PlaylistKind::Playlist);

    // Les playlists virtuelles des clients dépendent de l'appartenance :
    // même sans changement d'item, la révision doit avancer.
    let before = catalog.revision();
    catalog.items_changed(Some(10), vec![host_item(1, "Un", FileType::Audio)], vec![], vec![]);
    assert!(catalog.revision() > before);
}

#[test]
fn test_share_type_filter_returns_tombstones() {
    let (_dir, config) = test_config();
    config.set_share_video(false).unwrap();
    let (catalog, _log) = make_catalog(MockHost::empty(), config.clone());

    catalog.item_list(
        None,
        vec![
            host_item(1, "Chanson", FileType::Audio),
            host_item(2, "Film", FileType::Video),
        ],
    );

    let items = catalog.get_items(None);
    assert!(items[&1].is_live());
    // L'id survit sous forme de pierre tombale : les clients en retard
    // voient la transition.
    assert!(!items[&2].is_live());
    assert_eq!(items.len(), 2);
}

#[test]
fn test_config_change_restamps_every_record() {
    let (_dir, config) = test_config();
    let (catalog, _log) = make_catalog(MockHost::empty(), config.clone());

    catalog.item_list(
        None,
        vec![
            host_item(1, "Un", FileType::Audio),
            host_item(2, "Film", FileType::Video),
        ],
    );
    catalog.playlist_added(vec![host_playlist(10, "Rock")], PlaylistKind::Playlist);

    let old_revisions: HashMap<DaapId, u64> = catalog
        .get_items(None)
        .iter()
        .map(|(item_id, entry)| (*item_id, entry.revision()))
        .collect();
    let before = catalog.revision();

    config.set_share_video(false).unwrap();
    catalog.on_config_changed(&ConfigEvent {
        key: "share.video".to_string(),
    });

    assert!(catalog.revision() > before);
    for (item_id, entry) in catalog.get_items(None) {
        assert!(
            entry.revision() > old_revisions[&item_id],
            "item {item_id} was not restamped"
        );
    }
    for (_, entry) in catalog.get_playlists() {
        assert_eq!(entry.revision(), catalog.revision());
    }

    // Clé sans effet sur les types partagés : pas de bump
    let stable = catalog.revision();
    catalog.on_config_changed(&ConfigEvent {
        key: "share.name".to_string(),
    });
    assert_eq!(catalog.revision(), stable);
}

#[test]
fn test_podcast_playlist_hidden_when_feed_sharing_off() {
    let (_dir, config) = test_config();
    let (catalog, _log) = make_catalog(MockHost::empty(), config.clone());

    catalog.feed_added(vec![host_feed(20, "Emissions", "http://example.com/rss")]);
    catalog.playlist_added(vec![host_playlist(10, "Rock")], PlaylistKind::Playlist);

    // share.feed est false par défaut
    let playlists = catalog.get_playlists();
    assert!(playlists[&10].is_live());
    assert!(!playlists[&20].is_live());

    config.set_share_feed(true).unwrap();
    catalog.on_config_changed(&ConfigEvent {
        key: "share.feed".to_string(),
    });
    let playlists = catalog.get_playlists();
    assert!(playlists[&20].is_live());
}

#[test]
fn test_populate_seeds_playlists_and_skips_ersatz_feeds() {
    let (_dir, config) = test_config();
    let host = Arc::new(MockHost {
        playlists: vec![
            host_playlist(10, "Rock"),
            HostPlaylist {
                is_folder: true,
                ..host_playlist(11, "Dossier")
            },
        ],
        feeds: vec![
            host_feed(20, "Emissions", "http://example.com/rss"),
            host_feed(21, "Recherche", "dtv:searchDownloads"),
        ],
        memberships: HashMap::from([(10, vec![1, 2]), (20, vec![3])]),
        ..MockHost::default()
    });
    let (catalog, _log) = make_catalog(host.clone(), config);

    catalog.start_tracking();

    let playlists = catalog.get_playlists();
    // Le dossier et le flux artificiel ne sont pas exportés
    assert_eq!(playlists.len(), 2);
    assert!(playlists.contains_key(&10));
    assert!(playlists.contains_key(&20));
    assert_eq!(catalog.playlist_membership(10), vec![1, 2]);
    assert_eq!(catalog.playlist_membership(20), vec![3]);

    // Suivi : bibliothèque d'abord, puis chaque scope exporté
    let tracked = host.tracked.lock().unwrap();
    assert_eq!(tracked[0], None);
    assert_eq!(tracked.len(), 3);

    // Retrait d'une playlist : pierre tombale + désabonnement
    drop(tracked);
    catalog.playlist_removed(vec![10]);
    assert!(!catalog.get_playlists()[&10].is_live());
    assert!(catalog.playlist_membership(10).is_empty());
    let untracked = host.untracked.lock().unwrap();
    assert_eq!(*untracked, vec![Some((10, PlaylistKind::Playlist))]);
}
