/// Threaded front end for a master shared by several clients.
///
/// The master lives on its own worker thread; clients submit one request at
/// a time and collect the completion later. A client that leaves the bus
/// held (`send_stop = false`) keeps it until it ends the transaction; requests
/// from other clients wait in arrival order meanwhile.

use std::collections::VecDeque;
use std::sync::atomic::{
	AtomicUsize,
	Ordering,
};
use std::sync::mpsc::{
	self,
	Receiver,
	Sender,
	TryRecvError,
};
use std::thread::{
	self,
	JoinHandle,
};

use crate::master::{
	Master,
	ReadResult,
	TransferOutcome,
	WriteResult,
};
use crate::AResult;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Request {
	Write {
		address: u8,
		data: Vec<u8>,
		send_stop: bool,
	},
	Read {
		address: u8,
		len: usize,
		send_stop: bool,
	},
	/// end a transaction this client left open
	Stop,
}

/// Result of a `Request`, same variant order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Completion {
	Write(WriteResult),
	Read(ReadResult),
	Stopped,
}

struct Job {
	client: usize,
	request: Request,
	reply: Sender<Completion>,
}

enum Command {
	Submit(Job),
	// client dropped
	Disconnect(usize),
	Shutdown,
}

// returns the completion and whether the bus stays claimed; a fault may have
// released the bus even without `send_stop`
fn execute<M: Master + ?Sized>(master: &mut M, request: &Request) -> (Completion, bool) {
	let completion = match request {
		Request::Write { address, data, send_stop } => {
			Completion::Write(master.write(*address, data, *send_stop))
		},
		Request::Read { address, len, send_stop } => {
			Completion::Read(master.read(*address, *len, *send_stop))
		},
		Request::Stop => {
			master.send_stop();
			Completion::Stopped
		},
	};
	(completion, master.is_bus_held())
}

fn worker<M: Master>(mut master: M, commands: Receiver<Command>) -> M {
	let mut holder: Option<usize> = None;
	let mut deferred: VecDeque<Job> = VecDeque::new();

	loop {
		let job = match deferred.pop_front() {
			Some(job) if holder.is_none() => job,
			front => {
				if let Some(job) = front {
					deferred.push_front(job);
				}
				match commands.recv() {
					Ok(Command::Submit(job)) => job,
					Ok(Command::Disconnect(client)) => {
						deferred.retain(|job| job.client != client);
						if holder == Some(client) {
							debug!("client {} gone while holding the bus, sending STOP", client);
							master.send_stop();
							holder = None;
						}
						continue;
					},
					Ok(Command::Shutdown) | Err(_) => break,
				}
			},
		};

		if let Some(current) = holder {
			if current != job.client {
				trace!("client {} waits for client {} to release the bus", job.client, current);
				deferred.push_back(job);
				continue;
			}
		}

		let (completion, held) = execute(&mut master, &job.request);
		holder = if held { Some(job.client) } else { None };
		// the client may have gone away meanwhile
		let _ = job.reply.send(completion);
	}

	if holder.is_some() {
		master.send_stop();
	}
	debug!("I2C master service stopped");
	master
}

/// Spawns the worker thread owning a master.
pub struct MasterService;

impl MasterService {
	pub fn spawn<M: Master + Send + 'static>(master: M) -> AResult<ServiceHandle<M>> {
		let (tx, rx) = mpsc::channel();
		let handle = thread::Builder::new()
			.name("i2c-master".into())
			.spawn(move || worker(master, rx))?;
		Ok(ServiceHandle {
			commands: tx,
			next_client: AtomicUsize::new(0),
			worker: handle,
		})
	}
}

pub struct ServiceHandle<M> {
	commands: Sender<Command>,
	next_client: AtomicUsize,
	worker: JoinHandle<M>,
}

impl<M> ServiceHandle<M> {
	pub fn client(&self) -> Client {
		Client {
			id: self.next_client.fetch_add(1, Ordering::SeqCst),
			commands: self.commands.clone(),
			reply: None,
		}
	}

	/// Stop the worker after the request it is currently running. Pending
	/// requests are dropped; their clients see `None`.
	pub fn shutdown(&self) {
		let _ = self.commands.send(Command::Shutdown);
	}

	/// Wait for the worker to stop and take the master back.
	pub fn join(self) -> AResult<M> {
		self.shutdown();
		match self.worker.join() {
			Ok(master) => Ok(master),
			Err(_) => bail!("I2C master worker panicked"),
		}
	}
}

/// One user of the shared master; at most one request outstanding.
pub struct Client {
	id: usize,
	commands: Sender<Command>,
	// set while a request is pending
	reply: Option<Receiver<Completion>>,
}

impl Client {
	pub fn id(&self) -> usize {
		self.id
	}

	pub fn is_pending(&self) -> bool {
		self.reply.is_some()
	}

	/// Queue a request. `NotStarted` if the previous one has not completed
	/// yet or the service is gone.
	pub fn submit(&mut self, request: Request) -> TransferOutcome {
		if self.reply.is_some() {
			debug!("client {}: request refused, previous one still pending", self.id);
			return TransferOutcome::NotStarted;
		}
		let (reply_tx, reply_rx) = mpsc::channel();
		let job = Job {
			client: self.id,
			request,
			reply: reply_tx,
		};
		if self.commands.send(Command::Submit(job)).is_err() {
			return TransferOutcome::NotStarted;
		}
		self.reply = Some(reply_rx);
		TransferOutcome::Started
	}

	/// Completion of the pending request, if it is there yet.
	pub fn poll(&mut self) -> Option<Completion> {
		let result = match &self.reply {
			Some(reply) => reply.try_recv(),
			None => return None,
		};
		match result {
			Ok(completion) => {
				self.reply = None;
				Some(completion)
			},
			Err(TryRecvError::Empty) => None,
			Err(TryRecvError::Disconnected) => {
				self.reply = None;
				None
			},
		}
	}

	/// Block until the pending request completes; `None` without one or when
	/// the service stopped first.
	pub fn wait(&mut self) -> Option<Completion> {
		self.reply.take().and_then(|reply| reply.recv().ok())
	}
}

impl Drop for Client {
	fn drop(&mut self) {
		let _ = self.commands.send(Command::Disconnect(self.id));
	}
}
