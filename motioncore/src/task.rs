use std::{
    io,
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{error, info};

/// Closure run on its own thread at a fixed period.
///
/// Dropping the handle stops the loop and joins the thread.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F>(name: &str, period: Duration, mut body: F) -> io::Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let mut next = Instant::now();
                while flag.load(Ordering::Acquire) {
                    if body().is_break() {
                        break;
                    }
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                flag.store(false, Ordering::Release);
            })?;
        info!("started task {}", name);
        Ok(Self {
            name: name.to_owned(),
            running,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("task {} panicked", self.name);
            } else {
                info!("stopped task {}", self.name);
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_runs_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut task = PeriodicTask::spawn("counter", Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        })
        .unwrap();
        thread::sleep(Duration::from_millis(30));
        task.stop();
        assert!(!task.is_running());
        let stopped_at = count.load(Ordering::SeqCst);
        assert!(stopped_at > 0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), stopped_at);
    }

    #[test]
    fn test_break_ends_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut task = PeriodicTask::spawn("once", Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Break(())
        })
        .unwrap();
        task.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(task.name(), "once");
    }
}
