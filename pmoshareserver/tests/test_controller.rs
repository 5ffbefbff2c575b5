//! Contrôleur : activation/désactivation du partage, annonce mDNS,
//! changement de nom et sérialisation des requêtes frontend.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;

use pmoshareserver::{InterestCallbacks, ServerController};
use pmosharing::{DiscoveryTracker, EventLoop, MessageBus, SharingContext};

fn make_controller(
    config: Arc<pmoconfig::Config>,
    factory: Arc<MockServerFactory>,
    mdns: Arc<MockMdns>,
) -> (tempfile::TempDir, ServerController, EventLoop) {
    let dir = tempfile::tempdir().unwrap();
    let event_loop = EventLoop::start();
    let ctx = SharingContext::new(
        event_loop.clone(),
        MessageBus::new(),
        Arc::new(PanicClientFactory),
        dir.path().to_path_buf(),
    );
    let tracker = DiscoveryTracker::new(ctx, mdns.clone());
    let (catalog, _log) = make_catalog(MockHost::empty(), config.clone());
    let controller = ServerController::new(
        config,
        catalog,
        tracker,
        mdns,
        factory,
        event_loop.clone(),
    );
    (dir, controller, event_loop)
}

#[test]
fn test_enable_and_disable_sharing() {
    let (_config_dir, config) = test_config();
    config.set_sharing_enabled(true).unwrap();
    let factory = MockServerFactory::working();
    let mdns = MockMdns::new(" (2)");
    let (_dir, controller, event_loop) = make_controller(config.clone(), factory.clone(), mdns.clone());

    controller.start();

    assert!(controller.is_sharing());
    assert!(controller.is_discoverable());
    assert_eq!(factory.made_count(), 1);
    assert_eq!(mdns.registration_count(), 1);
    assert!(controller.server_address().is_some());
    {
        let registrations = mdns.registrations.lock().unwrap();
        assert_eq!(registrations[0].requested, "PMOShare Library");
        assert_eq!(registrations[0].port, 3689);
    }

    // Le nom mémorisé est celui attribué par mDNS, pas celui demandé
    assert!(wait_until(Duration::from_secs(2), || {
        controller.name() == "PMOShare Library (2)"
    }));

    // Coupure par la configuration : le watcher reconfigure
    config.set_sharing_enabled(false).unwrap();
    assert!(wait_until(Duration::from_secs(3), || !controller.is_sharing()));
    assert_eq!(mdns.unregistered_count(), 1);
    assert_eq!(controller.session_count(), 0);

    controller.shutdown();
    event_loop.shutdown();
}

#[test]
fn test_bind_failure_leaves_sharing_off() {
    let (_config_dir, config) = test_config();
    config.set_sharing_enabled(true).unwrap();
    let factory = MockServerFactory::failing();
    let mdns = MockMdns::new("");
    let (_dir, controller, event_loop) = make_controller(config, factory, mdns.clone());

    controller.start();

    assert!(!controller.is_sharing());
    assert!(!controller.is_discoverable());
    assert_eq!(mdns.registration_count(), 0);
    assert_eq!(controller.session_count(), 0);

    controller.shutdown();
    event_loop.shutdown();
}

#[test]
fn test_name_change_republishes_under_new_name() {
    let (_config_dir, config) = test_config();
    config.set_sharing_enabled(true).unwrap();
    let factory = MockServerFactory::working();
    let mdns = MockMdns::new("");
    let (_dir, controller, event_loop) = make_controller(config.clone(), factory.clone(), mdns.clone());

    controller.start();
    assert!(wait_until(Duration::from_secs(2), || {
        controller.name() == "PMOShare Library"
    }));

    config.set_share_name("Bibliothèque du salon").unwrap();

    // Dépublication, renommage du serveur, republication sous le nouveau nom
    assert!(wait_until(Duration::from_secs(3), || {
        mdns.registration_count() == 2
    }));
    assert_eq!(mdns.unregistered_count(), 1);
    {
        let registrations = mdns.registrations.lock().unwrap();
        assert_eq!(registrations[1].requested, "Bibliothèque du salon");
    }
    let made = factory.made.lock().unwrap();
    assert_eq!(*made[0].name.lock().unwrap(), "Bibliothèque du salon");
    drop(made);
    assert!(wait_until(Duration::from_secs(2), || {
        controller.name() == "Bibliothèque du salon"
    }));
    assert!(controller.is_sharing());
    assert!(controller.is_discoverable());

    controller.shutdown();
    event_loop.shutdown();
}

#[test]
fn test_frontend_toggle_is_serialized() {
    let (_config_dir, config) = test_config();
    let factory = MockServerFactory::working();
    let mdns = MockMdns::new("");
    let (_dir, controller, event_loop) = make_controller(config, factory, mdns);

    let journal: Arc<Mutex<Vec<(&'static str, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let start_journal = journal.clone();
    let end_journal = journal.clone();
    controller.register_interest(
        "toggle-widget",
        InterestCallbacks {
            start: Box::new(move |value| start_journal.lock().unwrap().push(("start", value))),
            end: Box::new(move |value| end_journal.lock().unwrap().push(("end", value))),
        },
    );

    // Première demande acceptée : callbacks start, configuration écrite
    assert!(controller.set_sharing_enabled(true));
    assert_eq!(*journal.lock().unwrap(), vec![("start", true)]);

    // Une seconde demande pendant la bascule est refusée
    assert!(!controller.set_sharing_enabled(false));
    assert_eq!(journal.lock().unwrap().len(), 1);

    // La reconfiguration termine la bascule : callbacks end, verrou levé
    controller.reconfigure();
    assert!(controller.is_sharing());
    assert_eq!(
        *journal.lock().unwrap(),
        vec![("start", true), ("end", true)]
    );

    assert!(controller.set_sharing_enabled(false));
    controller.reconfigure();
    assert!(!controller.is_sharing());

    controller.unregister_interest("toggle-widget");
    controller.shutdown();
    event_loop.shutdown();
}
