#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use wbind_core::{WatchConfig, watchize};
use wbind_resource::ResourceStore;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    if let Ok(round_trip) = watchize(&value).to_value() {
        assert_eq!(round_trip, value);
    }

    let store = ResourceStore::new(WatchConfig::default());
    if let Ok(resource) = store.load(&value) {
        let serialized = resource.serialize().unwrap();
        assert_eq!(serialized["data"], value["data"]);
        assert_eq!(serialized["id"], value["id"]);
        for key in resource.get_all().keys() {
            let _ = resource.resolve(key);
        }
    }
});
