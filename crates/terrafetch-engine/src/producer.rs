use std::path::Path;
use std::sync::Arc;

use terrafetch_core::{ProducerInfo, WorkItem};
use terrafetch_hooks::Hook;

/// One data module for a run: its identity, the items it discovered and the
/// hooks scoped to it.
pub struct Producer {
    pub info: Arc<ProducerInfo>,
    pub items: Vec<WorkItem>,
    pub hooks: Vec<Arc<dyn Hook>>,
}

impl Producer {
    pub fn new(info: Arc<ProducerInfo>, items: Vec<WorkItem>) -> Self {
        Self {
            info,
            items,
            hooks: Vec::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn Hook>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Static producer: one item per URL, destination derived from the URL's
    /// trailing path segment under the module's output directory. URLs with
    /// no usable filename become undownloadable passthrough items.
    pub fn from_urls<S: AsRef<str>>(
        name: &str,
        out_dir: impl AsRef<Path>,
        urls: &[S],
        data_type: &str,
    ) -> Self {
        let info = ProducerInfo::new(name, out_dir.as_ref());
        let items = urls
            .iter()
            .map(|url| {
                let url = url.as_ref();
                match url_filename(url) {
                    Some(filename) => {
                        WorkItem::new(url, info.out_dir.join(filename), data_type)
                    }
                    None => WorkItem::undownloadable(url, data_type),
                }
            })
            .collect();
        Self::new(info, items)
    }
}

/// Trailing path segment of a URL, with query and fragment stripped.
fn url_filename(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let rest = path.split_once("://").map_or(path, |(_, r)| r);
    let (_, name) = rest.rsplit_once('/')?;
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn destinations_come_from_the_url_path() {
        let producer = Producer::from_urls(
            "dem",
            "/data/dem",
            &["https://host/tiles/n40w105.tif?v=2"],
            "raster",
        );
        assert_eq!(
            producer.items[0].dest,
            Some(PathBuf::from("/data/dem/n40w105.tif"))
        );
    }

    #[test]
    fn a_bare_host_yields_an_undownloadable_item() {
        let producer = Producer::from_urls("dem", "/data/dem", &["https://host"], "raster");
        assert_eq!(producer.items[0].dest, None);
    }
}
