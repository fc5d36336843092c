//! Hotkey dispatch
//!
//! Every key press is matched against all bindings in config order. Each matching
//! binding writes its codes monitor by monitor, in file order. Failed writes are logged
//! and the remaining writes still go out.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Binding;
use crate::hotkey::KeyEvent;
use crate::monitor::{MonitorControl, VcpError};

/// Outcome of handling one key press
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Bindings that matched the event
    pub matched: usize,
    /// Device writes issued
    pub attempted: usize,
    pub failures: Vec<VcpError>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }
}

pub struct DispatchEngine {
    bindings: Vec<Binding>,
    monitors: MonitorControl,
}

impl DispatchEngine {
    pub fn new(bindings: Vec<Binding>, monitors: MonitorControl) -> Self {
        Self { bindings, monitors }
    }

    /// Bindings triggered by `event`, in config order
    pub fn matching<'a>(&'a self, event: &'a KeyEvent) -> impl Iterator<Item = &'a Binding> + 'a {
        self.bindings.iter().filter(move |binding| binding.matches(event))
    }

    /// Perform the writes of every binding matching `event`
    pub async fn dispatch(&self, event: &KeyEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for binding in self.matching(event) {
            report.matched += 1;
            log::info!(
                "Hotkey {} triggered ({} write(s))",
                binding.key_binding,
                binding.write_count()
            );

            for monitor in &binding.monitors {
                for setting in &monitor.codes {
                    log::info!(
                        "Setting monitor {} code 0x{:02x} to {}",
                        monitor.id,
                        setting.code,
                        setting.value
                    );
                    report.attempted += 1;
                    if let Err(e) = self
                        .monitors
                        .write_vcp(&monitor.id, setting.code, setting.value)
                        .await
                    {
                        log::error!("{}", e);
                        report.failures.push(e);
                    }
                }
            }
        }

        report
    }

    /// Handle key presses in arrival order until the stream ends or `shutdown` fires.
    /// Returns the number of events that matched at least one binding.
    pub async fn run(&self, mut events: mpsc::Receiver<KeyEvent>, shutdown: CancellationToken) -> usize {
        let mut handled = 0;
        log::info!("Listening for hotkeys ({} binding(s))", self.bindings.len());

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    log::info!("Shutdown requested, leaving event loop");
                    break;
                }

                received = events.recv() => {
                    let Some(event) = received else {
                        log::info!("Key event stream ended");
                        break;
                    };
                    let report = self.dispatch(&event).await;
                    if report.matched > 0 {
                        handled += 1;
                        log::debug!(
                            "Event {} done: {}/{} write(s) succeeded",
                            event,
                            report.succeeded(),
                            report.attempted
                        );
                    }
                }
            }
        }

        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeyBinding, MonitorAction, VcpSetting};
    use crate::hotkey::Modifier;
    use crate::monitor::fake::FakeMonitors;
    use std::sync::Arc;

    fn binding(modifier: Modifier, keycode: u32, monitors: Vec<(&str, Vec<(u8, u16)>)>) -> Binding {
        Binding {
            key_binding: KeyBinding { modifier, keycode },
            monitors: monitors
                .into_iter()
                .map(|(id, codes)| MonitorAction {
                    id: id.to_string(),
                    codes: codes.into_iter().map(|(c, v)| VcpSetting::new(c, v)).collect(),
                })
                .collect(),
        }
    }

    fn engine(fake: FakeMonitors, bindings: Vec<Binding>) -> (Arc<FakeMonitors>, DispatchEngine) {
        let fake = Arc::new(fake);
        let engine = DispatchEngine::new(bindings, MonitorControl::new(fake.clone()));
        (fake, engine)
    }

    fn press(modifier: Modifier, keycode: u32) -> KeyEvent {
        let mut event = KeyEvent {
            keycode,
            rawcode: keycode,
            ..Default::default()
        };
        match modifier {
            Modifier::Alt => event.alt_key = true,
            Modifier::Ctrl => event.ctrl_key = true,
            Modifier::Meta => event.meta_key = true,
            Modifier::Shift => event.shift_key = true,
        }
        event
    }

    fn write(id: &str, code: u8, value: u16) -> (String, u8, u16) {
        (id.to_string(), code, value)
    }

    #[test]
    fn test_matching_selects_exactly_matching_bindings() {
        let bindings = vec![
            binding(Modifier::Alt, 2, vec![]),
            binding(Modifier::Ctrl, 2, vec![]),
            binding(Modifier::Alt, 3, vec![]),
            binding(Modifier::Alt, 2, vec![("M2", vec![])]),
        ];
        let (_, engine) = engine(FakeMonitors::default(), bindings);

        let event = press(Modifier::Alt, 2);
        let matched: Vec<_> = engine.matching(&event).collect();
        assert_eq!(matched.len(), 2);
        assert!(std::ptr::eq(matched[0], &engine.bindings[0]));
        assert!(std::ptr::eq(matched[1], &engine.bindings[3]));
    }

    #[tokio::test]
    async fn test_single_write() {
        let (fake, engine) = engine(
            FakeMonitors::with_monitors(&["M1"]),
            vec![binding(Modifier::Alt, 2, vec![("M1", vec![(0x60, 15)])])],
        );

        let report = engine.dispatch(&press(Modifier::Alt, 2)).await;
        assert_eq!(report.matched, 1);
        assert_eq!(report.attempted, 1);
        assert_eq!(fake.writes(), vec![write("M1", 0x60, 15)]);
    }

    #[tokio::test]
    async fn test_all_matching_bindings_fire_in_config_order() {
        let (fake, engine) = engine(
            FakeMonitors::with_monitors(&["M1", "M2"]),
            vec![
                binding(Modifier::Shift, 5, vec![("M1", vec![(0x60, 15), (0x10, 50)]), ("M2", vec![(0x60, 17)])]),
                binding(Modifier::Meta, 5, vec![("M1", vec![(0x12, 1)])]),
                binding(Modifier::Shift, 5, vec![("M2", vec![(0x10, 90)])]),
            ],
        );

        let report = engine.dispatch(&press(Modifier::Shift, 5)).await;
        assert_eq!(report.matched, 2);
        assert_eq!(
            fake.writes(),
            vec![
                write("M1", 0x60, 15),
                write("M1", 0x10, 50),
                write("M2", 0x60, 17),
                write("M2", 0x10, 90),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_the_rest() {
        let mut fake = FakeMonitors::with_monitors(&["M1", "M2"]);
        fake.rejected.insert(("M1".to_string(), 0x60));
        let (fake, engine) = engine(
            fake,
            vec![
                binding(Modifier::Ctrl, 9, vec![("M1", vec![(0x60, 15), (0x10, 40)]), ("M2", vec![(0x60, 15)])]),
                binding(Modifier::Ctrl, 9, vec![("M1", vec![(0x60, 17)])]),
            ],
        );

        let report = engine.dispatch(&press(Modifier::Ctrl, 9)).await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(fake.writes().len(), 4);
    }

    #[tokio::test]
    async fn test_no_match_no_writes() {
        let (fake, engine) = engine(
            FakeMonitors::with_monitors(&["M1"]),
            vec![binding(Modifier::Alt, 2, vec![("M1", vec![(0x60, 15)])])],
        );

        let report = engine.dispatch(&press(Modifier::Ctrl, 2)).await;
        assert_eq!(report.matched, 0);
        assert!(fake.writes().is_empty());
    }

    #[tokio::test]
    async fn test_run_processes_events_in_order_until_stream_ends() {
        let (fake, engine) = engine(
            FakeMonitors::with_monitors(&["M1"]),
            vec![
                binding(Modifier::Alt, 2, vec![("M1", vec![(0x60, 15)])]),
                binding(Modifier::Alt, 3, vec![("M1", vec![(0x60, 17)])]),
            ],
        );

        let (tx, rx) = mpsc::channel(8);
        for keycode in [3, 2, 4, 3] {
            tx.send(press(Modifier::Alt, keycode)).await.unwrap();
        }
        drop(tx);

        let handled = engine.run(rx, CancellationToken::new()).await;
        assert_eq!(handled, 3);
        assert_eq!(
            fake.writes(),
            vec![write("M1", 0x60, 17), write("M1", 0x60, 15), write("M1", 0x60, 17)]
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_, engine) = engine(FakeMonitors::default(), Vec::new());
        let (_tx, rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert_eq!(engine.run(rx, shutdown).await, 0);
    }
}
