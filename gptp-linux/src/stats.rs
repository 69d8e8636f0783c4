//! Periodic status reports in the log

use std::time::Duration;

use gptp::observability::DomainStatus;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Log the status of every domain every `interval`, until cancelled
pub async fn report(
    interval: Duration,
    mut domains: Vec<watch::Receiver<DomainStatus>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately, while nothing has happened yet
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for domain in &mut domains {
            let status = domain.borrow_and_update().clone();
            log_status(&status);
        }
    }
}

fn log_status(status: &DomainStatus) {
    let offset = status
        .last_offset
        .map(|offset| offset.nanos_lossy())
        .unwrap_or(f64::NAN);

    tracing::info!(
        domain = status.domain_number,
        grandmaster = %status.grandmaster,
        steps_removed = status.steps_removed,
        is_grandmaster = status.is_grandmaster,
        offset_ns = offset,
        frequency_ppb = status.frequency_correction,
        clock_steps = status.clock_steps,
        "domain status"
    );

    for (index, port) in status.ports.iter().enumerate() {
        tracing::info!(
            domain = status.domain_number,
            port = index,
            state = %port.state,
            path_delay_ns = port.path_delay.map(|delay| delay.nanos_lossy()),
            rx_sync = port.counters.rx_sync,
            tx_sync = port.counters.tx_sync,
            lost_responses = port.counters.pdelay_lost_responses,
            "port status"
        );
    }

    match serde_json::to_string(status) {
        Ok(json) => tracing::debug!("{}", json),
        Err(error) => tracing::debug!("Could not encode status: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use gptp::ClockIdentity;

    use super::*;

    fn status(domain_number: u8) -> DomainStatus {
        DomainStatus {
            domain_number,
            grandmaster: ClockIdentity([1; 8]),
            steps_removed: 0,
            is_grandmaster: true,
            operational: false,
            last_offset: None,
            frequency_correction: None,
            rejected_offsets: 0,
            clock_steps: 0,
            ports: vec![],
        }
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let (_sender, receiver) = watch::channel(status(0));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(report(
            Duration::from_millis(10),
            vec![receiver],
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn keeps_reporting_after_domain_ends() {
        let (sender, receiver) = watch::channel(status(3));
        drop(sender);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(report(
            Duration::from_millis(5),
            vec![receiver],
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        cancel.cancel();
        task.await.unwrap();
    }
}
