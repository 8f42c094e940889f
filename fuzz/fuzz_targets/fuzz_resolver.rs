//! Fuzz testing for inbound path resolution.
//!
//! Feeds arbitrary strings to the resolver and checks that it never panics
//! and that every accepted path maps to a well-formed upstream URL.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_resolver
//! cargo +nightly fuzz run fuzz_resolver -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use posts_proxy::proxy::{Shape, TargetResolution, allowed_methods, resolve};

const BASE: &str = "http://upstream.test";

fuzz_target!(|data: &[u8]| {
    let Ok(path) = std::str::from_utf8(data) else {
        return;
    };

    for inbound in [path.to_string(), format!("/api/{path}")] {
        match resolve(BASE, &inbound) {
            TargetResolution::Resolved { url, shape } => {
                let tail = url
                    .strip_prefix(BASE)
                    .expect("resolved URL must start with the base");
                match shape {
                    Shape::Collection => assert_eq!(tail, "/posts"),
                    Shape::Item => {
                        let id = tail
                            .strip_prefix("/posts/")
                            .expect("item URL must be under /posts/");
                        assert!(!id.is_empty());
                        assert!(id.bytes().all(|b| b.is_ascii_digit()));
                    }
                }
                assert!(!allowed_methods(shape).as_slice().is_empty());
            }
            TargetResolution::Rejected(_) => {}
        }
    }
});
