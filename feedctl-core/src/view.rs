/// Presentation collaborator. Feeds are referred to by store index only;
/// after a change notification the view reads the slot again.
///
/// Called from reload worker threads, hence `Send + Sync`.
pub trait View: Send + Sync {
    /// The whole feed list was replaced (subscription reload, re-sort).
    fn feedlist_changed(&self, _len: usize) {}

    /// The item list of the feed at `index` was replaced by a merge.
    fn itemlist_changed(&self, _index: usize) {}

    fn set_status(&self, _message: &str) {}

    fn show_error(&self, _message: &str) {}
}

/// View that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullView;

impl View for NullView {}
