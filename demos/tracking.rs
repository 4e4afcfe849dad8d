//! Asset Tracking Example
//!
//! Feeds vehicle position updates into a batched store and a quad-tree index,
//! then asks which vehicles are inside a few regions.

use quadcache::prelude::*;
use std::error::Error;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct Position {
    lng: f64,
    lat: f64,
    speed_kmh: f64,
}

fn main() -> std::result::Result<(), Box<dyn Error>> {
    env_logger::init();
    println!("=== Asset Tracking with quadcache ===\n");

    let sink = Arc::new(MemorySink::<String, Position>::new());
    let store = CacheBuilder::new(sink.clone())
        .batch_size(4)
        .flush_interval(Duration::from_millis(250))
        .caller_sends(false)
        .build()?;

    let index = SpatialIndex::with_config(
        IndexConfig::default().with_max_depth(16),
        |p: &Position| -> Result<Envelope> { Ok(Envelope::from_point(p.lng, p.lat)) },
    )?;

    // 1. Initial positions
    println!("1. Registering fleet");
    let fleet = [
        ("truck-001", -74.0060, 40.7128),
        ("truck-002", -73.9857, 40.7484),
        ("van-001", -0.1278, 51.5074),
        ("van-002", 2.3522, 48.8566),
        ("bike-001", 139.6917, 35.6895),
    ];

    for (id, lng, lat) in fleet {
        let position = Position {
            lng,
            lat,
            speed_kmh: 0.0,
        };
        store.put(id.to_string(), position.clone())?;
        index.upsert(id.to_string(), &position)?;
        println!("   {} at ({:.4}, {:.4})", id, lng, lat);
    }

    // 2. Movement: truck-002 drives from Manhattan to Newark
    println!("\n2. Moving truck-002 west");
    for step in 1..=5 {
        let position = Position {
            lng: -73.9857 - step as f64 * 0.04,
            lat: 40.7484 - step as f64 * 0.004,
            speed_kmh: 48.0,
        };
        store.put("truck-002".to_string(), position.clone())?;
        index.upsert("truck-002".to_string(), &position)?;
    }
    let latest = store.get(&"truck-002".to_string())?;
    println!("   latest cached position: {:?}", latest);

    // 3. Region queries
    println!("\n3. Region queries");
    let regions = [
        ("New York metro", Envelope::new(-74.5, -73.5, 40.4, 41.0)),
        ("Western Europe", Envelope::new(-5.0, 10.0, 45.0, 55.0)),
        ("Pacific", Envelope::new(150.0, 180.0, -30.0, 30.0)),
    ];

    for (name, region) in &regions {
        let mut hits: Vec<String> = index.query(region)?.into_iter().collect();
        hits.sort();
        println!("   {}: {:?}", name, hits);
        for id in &hits {
            if let Some(position) = store.get(id)? {
                println!(
                    "      {} -> ({:.4}, {:.4}) at {:.0} km/h",
                    id, position.lng, position.lat, position.speed_kmh
                );
            }
        }
    }

    // 4. Decommission a vehicle
    println!("\n4. Retiring bike-001");
    index.remove(&"bike-001".to_string());
    store.remove(&"bike-001".to_string())?;
    println!("   indexed vehicles: {}", index.len());

    // 5. Shut down and report
    store.close()?;
    let stats = store.stats();
    println!("\n5. Store statistics");
    println!("   puts: {}", stats.puts);
    println!("   flushes: {} ({} entries)", stats.flushes, stats.flushed_entries);
    println!("   total flush time: {:?}", stats.total_flush_time);
    println!("   entries in sink: {}", sink.len());
    println!("   index: {:?}", index.stats());

    Ok(())
}
