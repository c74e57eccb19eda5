use geowatch::{GeoWatch, Point, QueryCriteria};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🌍 GeoWatch Live Query Demo");

    let geo = GeoWatch::memory();

    // Seed a few vehicles around the Bay Area
    println!("\n📍 Seeding locations:");
    geo.set("muni-1042", Point::new(37.7749, -122.4194))?; // downtown SF
    geo.set("muni-2071", Point::new(37.7793, -122.4193))?; // civic center
    geo.set("ferry-9", Point::new(37.8272, -122.4230))?; // alcatraz waters
    geo.set("caltrain-310", Point::new(37.4419, -122.1430))?; // palo alto
    println!("Wrote 4 locations");

    // Open a live query over a 5 km circle around downtown
    let downtown = Point::new(37.7749, -122.4194);
    let query = geo.query(QueryCriteria::new(downtown, 5.0))?;

    println!("\n🔎 Live query: 5 km around downtown SF");
    let entered = Arc::new(AtomicUsize::new(0));
    let entered_count = entered.clone();
    query.on_key_entered(move |key, location, distance_km| {
        entered_count.fetch_add(1, Ordering::SeqCst);
        println!("  + {key} entered at {location} ({distance_km:.2} km away)");
    });
    query.on_key_moved(|key, location, distance_km| {
        println!("  ~ {key} moved to {location} ({distance_km:.2} km away)");
    });
    query.on_key_exited(|key, location, _| match location {
        Some(location) => println!("  - {key} exited toward {location}"),
        None => println!("  - {key} deleted"),
    });
    query.on_ready(|| println!("  … initial data loaded"));
    println!("{} vehicles currently inside", entered.load(Ordering::SeqCst));

    // Move a vehicle within the circle, then out of it
    println!("\n🚌 Moving muni-1042:");
    geo.set("muni-1042", Point::new(37.7694, -122.4262))?; // still inside
    geo.set("muni-1042", Point::new(37.4419, -122.1430))?; // gone south

    // Deleting an inside vehicle exits it with a null payload
    println!("\n🗑  Removing muni-2071:");
    geo.remove("muni-2071")?;

    // Re-aim the same query at Palo Alto
    println!("\n🔁 Re-centering the query on Palo Alto:");
    query.update_criteria(QueryCriteria::from_center(Point::new(37.4419, -122.1430)))?;

    println!("\nQuery center is now {}", query.center()?);
    query.cancel();
    println!("Query cancelled — no further events fire");

    Ok(())
}
