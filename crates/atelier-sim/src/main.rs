//! Native driver: two sessions editing one in-memory room.
//!
//! Usage: `atelier-sim [config.json]`

use atelier_core::storage::MemoryStorage;
use atelier_core::{
    ConnectionType, Element, ElementPatch, Identity, IdentityProvider, LayerBus,
    MemoryRoomService, Session, SessionConfig, SessionEvent, StaticIdentity,
};
use kurbo::Point;
use std::error::Error;

const ROOM: &str = "demo-room";

fn main() {
    env_logger::init();
    log::info!("Starting Atelier simulation");

    if let Err(e) = run() {
        log::error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}

fn load_config() -> Result<SessionConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            log::info!("Using config from {}", path);
            Ok(SessionConfig::from_json(&json)?)
        }
        None => Ok(SessionConfig::default()),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = load_config()?;
    let service = MemoryRoomService::new();
    let bus = LayerBus::new(config.layer_bus_capacity);

    let alice_user = StaticIdentity(Identity::new("alice", "Alice"));
    let bob_user = StaticIdentity(Identity::new("bob", "Bob"));

    let mut alice = Session::join(
        &service,
        ROOM,
        alice_user.current_user(),
        &bus,
        config.clone(),
    )?;
    let mut bob = Session::join(&service, ROOM, bob_user.current_user(), &bus, config)?;

    bob.subscribe(|event| {
        if let SessionEvent::SyncPushFailed { message } = event {
            println!("  bob: push failed ({})", message);
        }
    });

    // Alice sketches a small two-screen prototype
    let home = alice.add_element(
        Element::rectangle(Point::new(40.0, 40.0), 320.0, 200.0).with_name("Home"),
    )?;
    let details = alice.add_element(
        Element::rectangle(Point::new(480.0, 40.0), 320.0, 200.0).with_name("Details"),
    )?;
    alice.add_element(Element::text(Point::new(60.0, 60.0), "Welcome"))?;
    alice.add_connection(home, details, ConnectionType::Click);

    alice.begin_stroke(Point::new(60.0, 200.0), Default::default());
    for i in 1..=8 {
        alice.extend_stroke(Point::new(60.0 + i as f64 * 20.0, 200.0 + (i % 2) as f64 * 8.0));
    }
    alice.finish_stroke();

    bob.pump();
    print_document("after alice's edits", &alice, &bob);

    // Bob moves the details screen; alice sees it after pumping
    bob.update_element(details, &ElementPatch::default().moved_to(520.0, 80.0));
    alice.pump();
    print_document("after bob's move", &alice, &bob);

    // Undo is visible to collaborators
    alice.undo()?;
    bob.pump();
    print_document("after alice's undo", &alice, &bob);

    // Bob goes offline, edits locally, then reconnects and edits again
    service.set_offline(ROOM, bob.connection_id(), true);
    bob.add_element(Element::circle(Point::new(200.0, 300.0), 60.0, 60.0))?;
    alice.pump();
    println!(
        "partitioned: alice has {} elements, bob has {}",
        alice.elements().len(),
        bob.elements().len()
    );

    service.set_offline(ROOM, bob.connection_id(), false);
    bob.add_element(Element::line(Point::new(0.0, 400.0), Point::new(300.0, 400.0)))?;
    alice.pump();
    print_document("after reconnect", &alice, &bob);

    // Layer flags stay local to the browser and persist through storage
    let storage = MemoryStorage::new();
    alice.toggle_lock(home);
    pollster::block_on(alice.save_layers(&storage))?;
    bob.pump();
    pollster::block_on(bob.load_layers(&storage))?;
    println!(
        "home locked for alice: {}, for bob: {}",
        alice.layers().is_locked(home),
        bob.layers().is_locked(home)
    );

    if let Some(target) = alice.target_of(home, ConnectionType::Click) {
        println!("clicking Home navigates to {}", target);
    }

    alice.leave();
    bob.leave();
    log::info!("Peers left in room: {}", service.peer_count(ROOM));
    Ok(())
}

fn print_document(label: &str, alice: &Session, bob: &Session) {
    let converged = alice.elements() == bob.elements();
    println!(
        "{}: {} elements, converged: {}",
        label,
        alice.elements().len(),
        converged
    );
    for element in alice.elements() {
        let bounds = element.bounds();
        println!(
            "  {:<9} {:<10} at ({:.0}, {:.0})",
            element.kind.type_name(),
            element.name.as_deref().unwrap_or("-"),
            bounds.x0,
            bounds.y0
        );
    }
}
