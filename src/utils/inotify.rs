use std::{collections::HashMap, path::Path, thread, time::Duration};

use anyhow::{Context, Result};
use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use log::debug;

// 编辑器保存时常见 rename 替换，等待新文件落盘
const WAIT_MOVE: Duration = Duration::from_millis(500);

pub struct InotifyWatcher {
    inotify: Inotify,
    watches: HashMap<WatchDescriptor, (String, WatchMask)>,
}

impl InotifyWatcher {
    pub fn new() -> Result<Self> {
        let inotify = Inotify::init().with_context(|| "Failed to initialize inotify")?;

        Ok(Self {
            inotify,
            watches: HashMap::new(),
        })
    }

    pub fn add<P: AsRef<Path>>(&mut self, path: P, mask: WatchMask) -> Result<()> {
        let path_ref = path.as_ref();
        let path_str = path_ref
            .to_str()
            .with_context(|| format!("Invalid path: {}", path_ref.display()))?;

        let mask = mask | WatchMask::DELETE_SELF | WatchMask::MOVE_SELF;
        let wd = self
            .inotify
            .watches()
            .add(path_ref, mask)
            .with_context(|| format!("Failed to add watch for: {}", path_ref.display()))?;

        self.watches.insert(wd, (path_str.to_string(), mask));
        Ok(())
    }

    /// 阻塞直到有事件，返回本批事件数量
    pub fn wait_and_handle(&mut self) -> Result<usize> {
        let mut buffer = [0; 4096];
        let mut stale = Vec::new();
        let mut count = 0;

        let events = self
            .inotify
            .read_events_blocking(&mut buffer)
            .with_context(|| "Failed to read inotify events")?;

        for event in events {
            count += 1;
            let replaced = event.mask.contains(EventMask::IGNORED)
                || event.mask.contains(EventMask::DELETE_SELF)
                || event.mask.contains(EventMask::MOVE_SELF);
            if replaced && self.watches.contains_key(&event.wd) {
                stale.push(event.wd.clone());
            }
        }

        for wd in stale {
            self.rewatch(wd)?;
        }

        Ok(count)
    }

    fn rewatch(&mut self, wd: WatchDescriptor) -> Result<()> {
        let Some((path, mask)) = self.watches.remove(&wd) else {
            return Ok(());
        };

        if !Path::new(&path).exists() {
            thread::sleep(WAIT_MOVE);
        }

        debug!("Re-adding watch for {path}");
        let new_wd = self
            .inotify
            .watches()
            .add(&path, mask)
            .with_context(|| format!("Failed to re-add watch for: {path}"))?;
        self.watches.insert(new_wd, (path, mask));
        Ok(())
    }
}
