//! Literal end-to-end scenarios from the specification's testable
//! properties: self-query match, disjoint-hash query, two-track
//! disambiguation, delete-then-query, and the `lastTime = 3H` segment
//! boundary case.

use sonicmatch::config::Config;
use sonicmatch::decision::Classification;
use sonicmatch::segmenter;
use sonicmatch::track::Fingerprint;
use sonicmatch::AppContext;

fn padded_code(head: &str, elbow: usize, salt: u32) -> String {
    let mut out = head.to_string();
    let have = head.split_whitespace().count() / 2;
    let base = 5_000_000 + salt * 1_000_000;
    for i in have..(2 * elbow).max(have) {
        out.push_str(&format!(" {} {}", base + i as u32, base + i as u32));
    }
    out
}

fn fingerprint(track_id: &str, fp: &str) -> Fingerprint {
    Fingerprint {
        track_id: Some(track_id.to_string()),
        fp: fp.to_string(),
        length: 30,
        codever: "4.12".into(),
        artist: Some("Example Artist".into()),
        release: None,
        track: Some("Example Song".into()),
        source: None,
        import_date: None,
    }
}

#[test]
fn ingesting_a_track_and_querying_its_own_codes_matches() {
    let ctx = AppContext::in_memory(Config::default());
    let code = padded_code("10 0 20 10 30 20 40 30 50 40", 10, 0);

    ctx.ingest(vec![fingerprint("TRSELF01", &code)], false).unwrap();

    let response = ctx.query(&code).unwrap();
    assert!(response.classification.is_match());
    assert_eq!(response.track_id.as_deref(), Some("TRSELF01"));
    assert_eq!(response.metadata.as_ref().unwrap().artist.as_deref(), Some("Example Artist"));
}

#[test]
fn querying_disjoint_hashes_yields_no_results() {
    let ctx = AppContext::in_memory(Config::default());
    let code = padded_code("10 0 20 10 30 20", 10, 0);
    ctx.ingest(vec![fingerprint("TRSELF02", &code)], false).unwrap();

    let disjoint_query = padded_code("777 0 888 10", 10, 1);
    let response = ctx.query(&disjoint_query).unwrap();
    assert_eq!(response.classification, Classification::NoResults);
}

#[test]
fn deleting_a_track_then_querying_no_longer_matches() {
    let ctx = AppContext::in_memory(Config::default());
    let code = padded_code("10 0 20 10 30 20 40 30", 10, 0);
    ctx.ingest(vec![fingerprint("TRDEL0001", &code)], false).unwrap();

    ctx.delete(&["TRDEL0001".to_string()]).unwrap();

    let response = ctx.query(&code).unwrap();
    assert!(!response.classification.is_match());
}

#[test]
fn two_tracks_with_a_shared_hash_disambiguate_to_the_aligned_one() {
    let ctx = AppContext::in_memory(Config::default());

    let winner_code = padded_code(
        "100 0 200 10 300 20 400 30 500 40 600 50 700 60 800 70 900 80 1000 90",
        10,
        0,
    );
    ctx.ingest(vec![fingerprint("TRWINNER1", &winner_code)], false).unwrap();

    // Shares two hashes with the winner but at unrelated time offsets.
    let decoy_code = padded_code("100 9000 200 9500", 10, 1);
    ctx.ingest(vec![fingerprint("TRDECOY01", &decoy_code)], false).unwrap();

    let response = ctx.query(&winner_code).unwrap();
    assert!(response.classification.is_match());
    assert_eq!(response.track_id.as_deref(), Some("TRWINNER1"));
}

#[test]
fn a_track_spanning_three_half_segments_yields_four_segments() {
    let last_time = segmenter::HALF_SEGMENT.mul_add(3.0, 1.0).ceil() as u32;
    let code = format!("1 0 2 {last_time}");

    let segments = segmenter::split("TRLONGTRK", &code, &Default::default()).unwrap();
    assert_eq!(segments.len(), 4);

    let ctx = AppContext::in_memory(Config::default());
    let ids = ctx.ingest(vec![fingerprint("TRLONGTRK", &code)], true).unwrap();
    assert_eq!(ids, vec!["TRLONGTRK".to_string()]);
}
