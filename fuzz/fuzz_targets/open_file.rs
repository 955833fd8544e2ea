#![no_main]

use libfuzzer_sys::fuzz_target;
use rootio::{ReadOptions, RootFile};

fuzz_target!(|data: &[u8]| {
    let Ok(f) = RootFile::from_bytes(data.to_vec()) else {
        return;
    };
    let _ = f.list_keys_recursive();
    let _ = f.streamer_infos();
    for key in f.list_keys() {
        let Ok(tree) = f.get_tree(&key.path) else {
            let _ = f.get_object(&key.path);
            continue;
        };
        for name in tree.branch_names() {
            if let Ok(reader) = f.branch_reader(&tree, name) {
                let stop = reader.numentries().min(64);
                let _ = reader.array(0..stop, &ReadOptions::default());
            }
        }
    }
});
