//! Terminal rendering of pipeline progress

use std::sync::Mutex;

use dbzip_core::pipeline::Stage;
use dbzip_core::progress::{ProgressEvent, ProgressObserver, TracingObserver};
use indicatif::ProgressBar;

use crate::output;

/// Shows one progress bar per stage and logs every event at debug
pub struct TerminalObserver {
    hidden: bool,
    current: Mutex<Option<(Stage, ProgressBar)>>,
}

impl TerminalObserver {
    pub fn new(hidden: bool) -> Self {
        Self {
            hidden,
            current: Mutex::new(None),
        }
    }

    /// Close whatever bar is still open
    pub fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
        }
    }

    fn new_bar(&self, stage: Stage) -> ProgressBar {
        if self.hidden {
            ProgressBar::hidden()
        } else {
            output::stage_bar(&stage.to_string())
        }
    }
}

impl ProgressObserver for TerminalObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        TracingObserver.on_progress(event);

        let Ok(mut current) = self.current.lock() else {
            return;
        };
        let stale = !matches!(&*current, Some((stage, _)) if *stage == event.stage);
        if stale {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
            *current = Some((event.stage, self.new_bar(event.stage)));
        }

        if let Some((_, bar)) = current.as_ref() {
            if let Some(percent) = event.percent_complete {
                bar.set_position(u64::from(percent));
            }
            bar.set_message(event.message.clone());
        }
    }
}

impl Drop for TerminalObserver {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(stage: Stage, percent: Option<u8>) -> ProgressEvent {
        ProgressEvent {
            stage,
            percent_complete: percent,
            message: "working".to_string(),
        }
    }

    #[test]
    fn test_new_stage_replaces_bar() {
        let observer = TerminalObserver::new(true);
        observer.on_progress(&event(Stage::Producing, Some(40)));
        observer.on_progress(&event(Stage::Producing, Some(80)));
        {
            let current = observer.current.lock().unwrap();
            let (stage, bar) = current.as_ref().unwrap();
            assert_eq!(*stage, Stage::Producing);
            assert_eq!(bar.position(), 80);
        }

        observer.on_progress(&event(Stage::Compressing, None));
        {
            let current = observer.current.lock().unwrap();
            let (stage, bar) = current.as_ref().unwrap();
            assert_eq!(*stage, Stage::Compressing);
            assert_eq!(bar.position(), 0);
        }

        observer.finish();
        assert!(observer.current.lock().unwrap().is_none());
    }
}
