mod common;

use common::{guids, item, write_urls, Harness};
use feedctl_core::{Cache, ControllerError, ReloadError, SortOrder};

const F1: &str = "http://f1.example/rss";
const F2: &str = "http://f2.example/rss";
const F3: &str = "http://f3.example/rss";
const F4: &str = "http://f4.example/rss";

#[test]
fn subscription_reload_drops_removed_and_adds_new_feeds() {
    let h = Harness::new(&[F1, F2, F3], |_| {});
    h.seed(F2, vec![item("f2", true)]);
    h.seed(F4, vec![item("f4", true)]);
    let h = h.load();
    h.parser.respond(F1, vec![item("f1", true)]);
    h.controller.reload_all(true).unwrap();

    let f3_tagged = format!("{F3} news");
    write_urls(&h.url_file, &[F1, f3_tagged.as_str(), F4]);
    h.controller.reload_urls_file().unwrap();

    assert_eq!(h.controller.store().urls(), [F1, F3, F4]);
    assert_eq!(guids(&h.feed(F1)), ["f1"]);
    assert_eq!(guids(&h.feed(F4)), ["f4"]);
    assert_eq!(h.feed(F3).tags(), ["news"]);
    assert!(h
        .cache
        .known_feed_identifiers()
        .unwrap()
        .contains(&F2.to_string()));
    assert_eq!(h.view.feedlists.lock().unwrap().last(), Some(&3));
}

#[test]
fn shutdown_cleanup_prunes_unsubscribed_feeds() {
    let h = Harness::new(&[F1, F2], |_| {});
    h.seed(F1, vec![item("a", true)]);
    h.seed(F2, vec![item("b", true)]);
    let h = h.load();

    write_urls(&h.url_file, &[F1]);
    h.controller.reload_urls_file().unwrap();
    h.controller.cleanup_cache().unwrap();

    assert_eq!(h.cache.known_feed_identifiers().unwrap(), [F1]);
}

#[test]
fn firsttag_sort_applies_on_load_and_subscription_reload() {
    let urls = [
        "http://b.example/rss Zeta",
        "http://u.example/rss",
        "http://a.example/rss alpha",
        "http://v.example/rss",
    ];
    let h = Harness::new(&urls, |c| c.feed_sort_order = SortOrder::FirstTag).load();
    assert_eq!(
        h.controller.store().urls(),
        [
            "http://a.example/rss",
            "http://b.example/rss",
            "http://u.example/rss",
            "http://v.example/rss"
        ]
    );

    write_urls(&h.url_file, &["http://u.example/rss beta", "http://b.example/rss Zeta"]);
    h.controller.reload_urls_file().unwrap();
    assert_eq!(
        h.controller.store().urls(),
        ["http://u.example/rss", "http://b.example/rss"]
    );
}

#[test]
fn mark_all_read_targets_one_feed() {
    let h = Harness::new(&[F1, F2], |_| {});
    h.seed(F1, vec![item("a", true), item("b", true)]);
    h.seed(F2, vec![item("c", true)]);
    let h = h.load();

    let pos = h.controller.feed_index_by_url(F1).unwrap();
    h.controller.mark_all_read(pos).unwrap();

    assert_eq!(h.feed(F1).unread_item_count(), 0);
    assert_eq!(h.feed(F2).unread_item_count(), 1);
    assert_eq!(h.cache.unread_count().unwrap(), 1);
    assert!(matches!(
        h.controller.mark_all_read(42),
        Err(ControllerError::Reload(ReloadError::InvalidIndex(42)))
    ));
}

#[test]
fn mark_all_read_on_query_feed_marks_by_guid() {
    let query = "query:unread:unread";
    let h = Harness::new(&[F1, query], |_| {});
    h.seed(F1, vec![item("x", true), item("y", true)]);
    h.seed(query, vec![item("x", true)]);
    let h = h.load();

    let pos = h.controller.feed_index_by_url(query).unwrap();
    h.controller.mark_all_read(pos).unwrap();

    let stored = h.cache.internalize(F1).unwrap();
    let unread: Vec<&str> = stored
        .items
        .iter()
        .filter(|i| i.unread)
        .map(|i| i.guid.as_str())
        .collect();
    assert_eq!(unread, ["y"]);
}

#[test]
fn catchup_all_clears_every_feed() {
    let h = Harness::new(&[F1, F2], |_| {});
    h.seed(F1, vec![item("a", true)]);
    h.seed(F2, vec![item("b", true)]);
    let h = h.load();

    h.controller.catchup_all().unwrap();

    assert_eq!(h.controller.compute_unread_numbers().articles, 0);
    assert_eq!(h.cache.unread_count().unwrap(), 0);
}

#[test]
fn deleted_items_stop_counting() {
    let h = Harness::new(&[F1], |_| {});
    h.seed(F1, vec![item("a", true), item("b", true)]);
    let h = h.load();

    h.controller.mark_deleted("a", true).unwrap();

    assert_eq!(h.controller.compute_unread_numbers().articles, 1);
    assert_eq!(guids(&h.cache.internalize(F1).unwrap()), ["b"]);
}

#[test]
fn read_information_round_trips_through_files() {
    let h = Harness::new(&[F1], |_| {});
    h.seed(F1, vec![item("a", true), item("b", false)]);
    let h = h.load();

    let export = h.dir.path().join("read.txt");
    assert_eq!(h.controller.export_read_information(&export).unwrap(), 1);
    assert_eq!(std::fs::read_to_string(&export).unwrap(), "b\n");

    let import = h.dir.path().join("import.txt");
    std::fs::write(&import, "a\n\n").unwrap();
    assert_eq!(h.controller.import_read_information(&import).unwrap(), 1);
    assert_eq!(h.feed(F1).unread_item_count(), 0);
    assert_eq!(h.cache.unread_count().unwrap(), 0);

    let missing = h.dir.path().join("missing.txt");
    assert!(matches!(
        h.controller.import_read_information(&missing),
        Err(ControllerError::Io { .. })
    ));
}

#[test]
fn unread_numbers_count_feeds_with_unread_items() {
    let h = Harness::new(&[F1, F2, F3], |_| {});
    h.seed(F1, vec![item("a", true), item("b", true)]);
    h.seed(F2, vec![item("c", false)]);
    let h = h.load();

    let counts = h.controller.compute_unread_numbers();
    assert_eq!(counts.feeds, 1);
    assert_eq!(counts.articles, 2);
}
