//! Async access to monitors: timeouts, input survey and input toggling

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::{InputSource, MonitorId, MonitorPort, VcpCode, VcpError, VcpReading, INPUT_SOURCE};

/// Default limit on a single DDC/CI call
pub const DEFAULT_VCP_TIMEOUT: Duration = Duration::from_secs(2);

/// Time a monitor needs after an input switch before it accepts further commands
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Shared handle to the monitors. Device calls run on the blocking pool.
#[derive(Clone)]
pub struct MonitorControl {
    port: Arc<dyn MonitorPort>,
    timeout: Duration,
    settle_delay: Duration,
}

impl MonitorControl {
    pub fn new(port: Arc<dyn MonitorPort>) -> Self {
        Self {
            port,
            timeout: DEFAULT_VCP_TIMEOUT,
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Run a blocking device call with the configured timeout
    async fn device_call<T, F>(
        &self,
        monitor: &str,
        code: VcpCode,
        call: F,
        on_abort: fn(MonitorId, VcpCode, String) -> VcpError,
    ) -> Result<T, VcpError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MonitorPort) -> Result<T, VcpError> + Send + 'static,
    {
        let port = self.port.clone();
        let task = tokio::task::spawn_blocking(move || call(port.as_ref()));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(on_abort(
                monitor.to_string(),
                code,
                format!("device task failed: {}", join_err),
            )),
            Err(_) => Err(VcpError::Timeout {
                monitor: monitor.to_string(),
                code,
                after: self.timeout,
            }),
        }
    }

    pub async fn list_monitors(&self) -> Result<Vec<MonitorId>, VcpError> {
        let port = self.port.clone();
        tokio::task::spawn_blocking(move || port.list_monitors())
            .await
            .map_err(|e| VcpError::Enumerate(e.to_string()))?
    }

    pub async fn read_vcp(&self, monitor: &str, code: VcpCode) -> Result<VcpReading, VcpError> {
        let id = monitor.to_string();
        self.device_call(
            monitor,
            code,
            move |port| port.read_vcp(&id, code),
            |monitor, code, message| VcpError::Read {
                monitor,
                code,
                message,
            },
        )
        .await
    }

    pub async fn write_vcp(&self, monitor: &str, code: VcpCode, value: u16) -> Result<(), VcpError> {
        let id = monitor.to_string();
        self.device_call(
            monitor,
            code,
            move |port| port.write_vcp(&id, code, value),
            |monitor, code, message| VcpError::Write {
                monitor,
                code,
                message,
            },
        )
        .await
    }

    /// Current input source of every monitor.
    /// Monitors that fail the read are logged and left out.
    pub async fn survey_inputs(&self) -> Result<Vec<(MonitorId, u16)>, VcpError> {
        let monitors = self.list_monitors().await?;
        let mut inputs = Vec::with_capacity(monitors.len());

        for monitor in monitors {
            match self.read_vcp(&monitor, INPUT_SOURCE).await {
                Ok(reading) => inputs.push((monitor, reading.current)),
                Err(e) => log::error!("VCP fetch failed: {}", e),
            }
        }

        Ok(inputs)
    }

    /// Toggle one monitor between DVI and HDMI 1, then wait for it to settle
    pub async fn flip_input(&self, monitor: &str) -> Result<InputSource, VcpError> {
        let current = self.read_vcp(monitor, INPUT_SOURCE).await?.current;
        let next = InputSource::toggled_from(current);

        log::info!("Setting {} to {}", monitor, next.value());
        self.write_vcp(monitor, INPUT_SOURCE, next.value()).await?;
        tokio::time::sleep(self.settle_delay).await;
        Ok(next)
    }

    /// Flip every monitor concurrently and wait for all of them
    pub async fn flip_all_monitors(
        &self,
    ) -> Result<Vec<(MonitorId, Result<InputSource, VcpError>)>, VcpError> {
        let monitors = self.list_monitors().await?;

        let mut tasks = JoinSet::new();
        for (index, monitor) in monitors.iter().cloned().enumerate() {
            let control = self.clone();
            tasks.spawn(async move {
                let result = control.flip_input(&monitor).await;
                (index, monitor, result)
            });
        }

        let mut results = Vec::with_capacity(monitors.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => results.push(outcome),
                Err(e) => log::error!("Input flip task failed: {}", e),
            }
        }

        results.sort_by_key(|(index, _, _)| *index);
        Ok(results
            .into_iter()
            .map(|(_, monitor, result)| (monitor, result))
            .collect())
    }
}
