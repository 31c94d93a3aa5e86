#![no_main]
use libfuzzer_sys::fuzz_target;
use scale_core::store::Database;

// A hand-edited db.json must never panic the loader, and whatever loads
// must serialise back to something that loads to the same record.
fuzz_target!(|data: &str| {
    let Ok(db) = serde_json::from_str::<Database>(data) else {
        return;
    };
    if db.events.iter().any(|e| !e.fast_slow_percentage.is_finite() || !e.error_percentage.is_finite()) {
        return;
    }
    let text = serde_json::to_string(&db).unwrap();
    let again: Database = serde_json::from_str(&text).unwrap();
    assert_eq!(again.events, db.events);
    assert_eq!(again.target_weight, db.target_weight);
});
