//! Fuzz testing for URL batch parsing.
//!
//! Feeds arbitrary request bodies and batch limits to `parse_url_batch` and
//! checks that parsing never panics and that an accepted batch honours the
//! limit and contains only URLs with a host.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_url_batch -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use response_sizer::validation::parse_url_batch;

#[derive(Debug, Arbitrary)]
struct BatchInput {
    body: String,
    max_urls: u8,
}

fuzz_target!(|input: BatchInput| {
    let max_urls = usize::from(input.max_urls);

    if let Ok(urls) = parse_url_batch(&input.body, max_urls) {
        assert!(urls.len() <= max_urls);
        for url in &urls {
            assert!(url.host().is_some());
        }
    }
});
