//! Scripted in-process engine: each "process" is a task that writes scripted
//! output into a duplex pipe, honors stop/kill, and reports an exit status.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{watch, Notify};

use vbc_core::engine::{EngineExit, EngineGateway, EngineProcess};
use vbc_core::error::LaunchError;
use vbc_core::job::JobSpec;

/// What one fake process does.
#[derive(Debug, Clone)]
pub struct Script {
    /// Output pieces, each written after its delay.
    pub pieces: Vec<(Duration, String)>,
    pub exit_code: i32,
    /// Create the destination file before exiting.
    pub write_output: bool,
    /// Keep running this long after closing the output stream.
    pub linger: Duration,
    /// Ignore the cooperative stop request.
    pub ignore_stop: bool,
    /// Ignore kill too; the process never exits on its own terms.
    pub unkillable: bool,
    pub fail_launch: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self::converting(10, 2, Duration::from_millis(10))
    }
}

impl Script {
    /// Duration header, `steps` stats lines `step` apart, exit 0.
    pub fn converting(total_secs: u32, steps: u32, step: Duration) -> Self {
        let mut pieces = vec![(
            Duration::ZERO,
            format!(
                "Input #0, avi, from 'in.avi':\n  Duration: {}, start: 0.000000, bitrate: 800 kb/s\nStream mapping:\n",
                hms(total_secs as f64)
            ),
        )];
        for i in 1..=steps {
            let pos = total_secs as f64 * i as f64 / steps as f64;
            pieces.push((
                step,
                format!(
                    "frame={} fps=25.0 q=28.0 size=1kB time={} bitrate=100.0kbits/s speed=1.00x\r",
                    i * 25,
                    hms(pos)
                ),
            ));
        }
        pieces.push((Duration::ZERO, "\n".to_string()));
        Self {
            pieces,
            exit_code: 0,
            write_output: true,
            linger: Duration::ZERO,
            ignore_stop: false,
            unkillable: false,
            fail_launch: false,
        }
    }

    /// Reports one stats line at the full duration, then keeps running for
    /// an hour without exiting.
    pub fn hang() -> Self {
        let mut script = Self::converting(100, 1, Duration::ZERO);
        script.pieces.push((Duration::from_secs(3600), String::new()));
        script
    }

    /// Prints an error and exits with `code`.
    pub fn failing(code: i32, error_line: &str) -> Self {
        Self {
            pieces: vec![(
                Duration::ZERO,
                format!("Input #0, avi, from 'in.avi':\n{}\n", error_line),
            )],
            exit_code: code,
            write_output: false,
            ..Self::converting(1, 0, Duration::ZERO)
        }
    }
}

fn hms(secs: f64) -> String {
    let whole = secs.floor() as u64;
    let frac = secs - whole as f64;
    format!(
        "{:02}:{:02}:{:05.2}",
        whole / 3600,
        (whole / 60) % 60,
        (whole % 60) as f64 + frac
    )
}

/// Gateway handing out scripted processes, keyed by input file name.
#[derive(Debug, Default)]
pub struct FakeEngine {
    scripts: Mutex<HashMap<String, Script>>,
    default_script: Script,
    stats: Arc<Stats>,
}

#[derive(Debug, Default)]
pub struct Stats {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub started: Mutex<Vec<String>>,
    pub stop_requests: AtomicUsize,
    pub kills: AtomicUsize,
}

impl Stats {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl FakeEngine {
    pub fn new(default_script: Script) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_script,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn script(self, input_name: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(input_name.to_string(), script);
        self
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }
}

static NEXT_PID: AtomicU32 = AtomicU32::new(50_000);

impl EngineGateway for FakeEngine {
    type Process = FakeProcess;

    fn start(&self, spec: &JobSpec) -> Result<FakeProcess, LaunchError> {
        let name = spec
            .input()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone());
        if script.fail_launch {
            return Err(LaunchError::Other(format!("cannot start for {}", name)));
        }
        self.stats.started.lock().unwrap().push(name);

        let now = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(now, Ordering::SeqCst);

        let (reader, writer) = tokio::io::duplex(4096);
        let (exit_tx, exit_rx) = watch::channel(None);
        let stop = Arc::new(Notify::new());
        let kill = Arc::new(Notify::new());
        let output = spec.output().to_path_buf();

        tokio::spawn({
            let stop = Arc::clone(&stop);
            let kill = Arc::clone(&kill);
            let stats = Arc::clone(&self.stats);
            let script = script.clone();
            async move {
                let exit = tokio::select! {
                    exit = play(script, writer, output) => exit,
                    _ = stop.notified() => EngineExit::signal(15),
                    _ = kill.notified() => EngineExit::signal(9),
                };
                stats.active.fetch_sub(1, Ordering::SeqCst);
                let _ = exit_tx.send(Some(exit));
            }
        });

        Ok(FakeProcess {
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
            output: Some(reader),
            exit: exit_rx,
            stop,
            kill,
            script,
            stats: Arc::clone(&self.stats),
        })
    }
}

async fn play(script: Script, mut writer: DuplexStream, output: std::path::PathBuf) -> EngineExit {
    for (delay, text) in &script.pieces {
        if !delay.is_zero() {
            tokio::time::sleep(*delay).await;
        }
        if !text.is_empty() && writer.write_all(text.as_bytes()).await.is_err() {
            break;
        }
    }
    if script.write_output {
        let _ = tokio::fs::write(&output, b"converted").await;
    }
    drop(writer);
    if !script.linger.is_zero() {
        tokio::time::sleep(script.linger).await;
    }
    EngineExit::code(script.exit_code)
}

pub struct FakeProcess {
    pid: u32,
    output: Option<DuplexStream>,
    exit: watch::Receiver<Option<EngineExit>>,
    stop: Arc<Notify>,
    kill: Arc<Notify>,
    script: Script,
    stats: Arc<Stats>,
}

impl EngineProcess for FakeProcess {
    type Output = DuplexStream;

    fn take_output(&mut self) -> Option<DuplexStream> {
        self.output.take()
    }

    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_wait(&mut self) -> io::Result<Option<EngineExit>> {
        Ok(*self.exit.borrow())
    }

    fn wait(&mut self) -> impl std::future::Future<Output = io::Result<EngineExit>> + Send + '_ {
        async move {
            let exit = *self
                .exit
                .wait_for(Option::is_some)
                .await
                .map_err(|_| io::Error::other("fake engine task vanished"))?;
            exit.ok_or_else(|| io::Error::other("no exit status"))
        }
    }

    fn request_stop(&mut self) -> io::Result<()> {
        self.stats.stop_requests.fetch_add(1, Ordering::SeqCst);
        if !self.script.ignore_stop {
            self.stop.notify_one();
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.stats.kills.fetch_add(1, Ordering::SeqCst);
        if !self.script.unkillable {
            self.kill.notify_one();
        }
        Ok(())
    }
}
