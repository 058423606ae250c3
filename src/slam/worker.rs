//! Background thread owning a [`SlamComputer`], driven by commands.
//!
//! The computer moves onto the worker thread and is handed back by [`ComputeWorker::shutdown`].
//! Progress and messages keep flowing through the computer's subscribers, command results
//! arrive on [`ComputeWorker::results`].

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};

use crate::{
    error::{Error, Result},
    slam::{
        markers::AnswerSummary,
        notifier::StopHandle,
        options::TrackingOptions,
        system::{ComputeOutcome, SlamComputer},
    },
};

/// Commands accepted by the worker thread
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    StartCompute,
    StartGenerateAnswer,
    UsePreviousResult(PathBuf),
    SetOptions(TrackingOptions),
    Shutdown,
}

/// Result of one command
#[derive(Debug)]
pub enum WorkerReply {
    Compute(Result<ComputeOutcome>),
    Answer(Result<Option<AnswerSummary>>),
    PreviousResult(Result<usize>),
}

pub struct ComputeWorker {
    commands: Sender<WorkerCommand>,
    replies: Receiver<WorkerReply>,
    running: StopHandle,
    handle: JoinHandle<SlamComputer>,
}

impl ComputeWorker {
    /// Spawn the worker thread around `computer`.
    pub fn spawn(computer: SlamComputer) -> Result<Self> {
        let (commands, command_rx) = unbounded();
        let (reply_tx, replies) = unbounded();
        let running = computer.stop_handle();

        let handle = thread::Builder::new()
            .name("slam-compute".into())
            .spawn(move || run_worker(computer, command_rx, reply_tx))?;

        Ok(Self {
            commands,
            replies,
            running,
            handle,
        })
    }

    pub fn send(&self, command: WorkerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Worker("compute worker has exited".into()))
    }

    pub fn results(&self) -> &Receiver<WorkerReply> {
        &self.replies
    }

    /// Stop the running computation, effective after its current unit of work.
    ///
    /// A stop sent while `StartCompute` is still queued is lost, starting a run
    /// raises the shared flag again.
    pub fn stop_compute(&self) {
        self.running.stop();
    }

    /// Stop any computation, end the thread and hand the computer back.
    pub fn shutdown(self) -> Result<SlamComputer> {
        self.running.stop();
        // the thread may already be gone after a panic, join reports that below
        let _ = self.commands.send(WorkerCommand::Shutdown);

        self.handle
            .join()
            .map_err(|_| Error::Worker("compute worker panicked".into()))
    }
}

fn run_worker(
    mut computer: SlamComputer,
    commands: Receiver<WorkerCommand>,
    replies: Sender<WorkerReply>,
) -> SlamComputer {
    info!("compute worker started");

    for command in commands.iter() {
        debug!("compute worker received {command:?}");
        let reply = match command {
            WorkerCommand::StartCompute => WorkerReply::Compute(computer.start_compute()),
            WorkerCommand::StartGenerateAnswer => {
                WorkerReply::Answer(computer.start_generate_answer())
            }
            WorkerCommand::UsePreviousResult(path) => {
                WorkerReply::PreviousResult(computer.use_previous_result(&path))
            }
            WorkerCommand::SetOptions(options) => {
                computer.set_options(options);
                continue;
            }
            WorkerCommand::Shutdown => break,
        };

        if replies.send(reply).is_err() {
            warn!("compute worker replies have no receiver");
        }
    }

    info!("compute worker stopped");
    computer
}
