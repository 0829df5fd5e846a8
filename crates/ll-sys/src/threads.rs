//! Applying a per-thread syscall to every thread of the process.
//!
//! `landlock_restrict_self(2)` and `prctl(PR_SET_NO_NEW_PRIVS)` only act on
//! the calling thread. A restriction that covers one thread of a
//! multi-threaded process is no restriction at all, so [`all_threads`]
//! repeats the operation on every thread listed in `/proc/self/task`.
//!
//! The task directory is opened before the calling thread runs the
//! operation: Landlock checks access when a directory is opened, not when an
//! open handle is read, so the list stays readable once the caller is
//! restricted.
//!
//! Other threads are reached with a real-time signal (`SIGRTMAX`). Its
//! handler, installed once through `signal-hook`, runs the raw syscall on
//! the receiving thread and publishes the result through atomics. The caller
//! waits for each thread in turn and re-reads the task list until every
//! thread has been visited, so threads spawned during the broadcast by a
//! not-yet-restricted thread are covered as well.
//!
//! Threads that block `SIGRTMAX` cannot be reached; the broadcast gives up on
//! them after [`ACK_TIMEOUT`] with `ETIMEDOUT`.

use std::os::fd::RawFd;
use std::time::Duration;

use nix::errno::Errno;

/// How long to wait for a single thread to run the operation.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// A syscall that must be applied to every thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOp {
    /// `prctl(PR_SET_NO_NEW_PRIVS, 1)`.
    NoNewPrivs,
    /// `landlock_restrict_self(ruleset, flags)`. The descriptor must stay open
    /// for the duration of the broadcast.
    RestrictSelf { ruleset: RawFd, flags: u32 },
}

impl ThreadOp {
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    fn run(self) -> Result<(), Errno> {
        match self {
            ThreadOp::NoNewPrivs => crate::landlock::set_no_new_privs(),
            ThreadOp::RestrictSelf { ruleset, flags } => {
                crate::landlock::restrict_self_raw(ruleset, flags)
            }
        }
    }
}

/// Runs `op` on the calling thread and then on every other thread of the process.
///
/// Broadcasts are serialized process-wide. If the calling thread fails, no
/// other thread is touched. If a later thread fails, the error is returned
/// and the threads visited so far keep the effect.
///
/// # Errors
///
/// The first `Errno` reported by any thread, `ETIMEDOUT` for a thread that
/// never ran the handler, or `ENOSYS` outside Linux.
pub fn all_threads(op: ThreadOp) -> Result<(), Errno> {
    platform::all_threads(op)
}

#[cfg(target_os = "linux")]
mod platform {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};
    use std::sync::{Mutex, OnceLock, PoisonError};
    use std::thread;
    use std::time::{Duration, Instant};

    use nix::dir::Dir;
    use nix::errno::Errno;
    use nix::fcntl::OFlag;
    use nix::sys::stat::Mode;

    use super::{ThreadOp, ACK_TIMEOUT};

    const POLL_INTERVAL: Duration = Duration::from_micros(50);

    const OP_NONE: u8 = 0;
    const OP_NO_NEW_PRIVS: u8 = 1;
    const OP_RESTRICT_SELF: u8 = 2;

    static BROADCAST: Mutex<()> = Mutex::new(());
    static HANDLER: OnceLock<Result<(), Errno>> = OnceLock::new();

    // The operation currently being broadcast. Written only while BROADCAST is held.
    static OP_KIND: AtomicU8 = AtomicU8::new(OP_NONE);
    static OP_FD: AtomicI32 = AtomicI32::new(-1);
    static OP_FLAGS: AtomicU32 = AtomicU32::new(0);

    // Thread expected to answer, and the generation of the request.
    static TARGET: AtomicI32 = AtomicI32::new(0);
    static GENERATION: AtomicU32 = AtomicU32::new(0);

    // Generation in the high half, errno (0 for success) in the low half.
    static REPLY: AtomicU64 = AtomicU64::new(0);

    pub fn all_threads(op: ThreadOp) -> Result<(), Errno> {
        let _guard = BROADCAST.lock().unwrap_or_else(PoisonError::into_inner);
        install_handler()?;
        let mut tasks = open_tasks()?;

        op.run()?;

        publish(Some(op));
        let result = broadcast(op, &mut tasks);
        publish(None);
        result
    }

    fn broadcast(op: ThreadOp, tasks: &mut Dir) -> Result<(), Errno> {
        let pid = std::process::id() as libc::pid_t;
        let mut visited = HashSet::from([gettid()]);
        loop {
            let pending: Vec<libc::pid_t> = task_ids(tasks)?
                .into_iter()
                .filter(|tid| !visited.contains(tid))
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            for tid in pending {
                visited.insert(tid);
                log::trace!("running {op:?} on thread {tid}");
                run_on(pid, tid)?;
            }
        }
    }

    fn run_on(pid: libc::pid_t, tid: libc::pid_t) -> Result<(), Errno> {
        let generation = GENERATION.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        TARGET.store(tid, Ordering::Release);

        match tgkill(pid, tid, signal()) {
            Ok(()) => {}
            // Exited between listing and signalling.
            Err(Errno::ESRCH) => return Ok(()),
            Err(e) => return Err(e),
        }

        let deadline = Instant::now() + ACK_TIMEOUT;
        loop {
            let reply = REPLY.load(Ordering::Acquire);
            if (reply >> 32) as u32 == generation {
                return match reply as u32 as i32 {
                    0 => Ok(()),
                    errno => Err(Errno::from_raw(errno)),
                };
            }
            // Signal 0 probes for the thread without a path lookup.
            if tgkill(pid, tid, 0) == Err(Errno::ESRCH) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Errno::ETIMEDOUT);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn publish(op: Option<ThreadOp>) {
        let (kind, fd, flags) = match op {
            None => (OP_NONE, -1, 0),
            Some(ThreadOp::NoNewPrivs) => (OP_NO_NEW_PRIVS, -1, 0),
            Some(ThreadOp::RestrictSelf { ruleset, flags }) => (OP_RESTRICT_SELF, ruleset, flags),
        };
        OP_FD.store(fd, Ordering::Release);
        OP_FLAGS.store(flags, Ordering::Release);
        OP_KIND.store(kind, Ordering::Release);
    }

    fn published() -> Option<ThreadOp> {
        match OP_KIND.load(Ordering::Acquire) {
            OP_NO_NEW_PRIVS => Some(ThreadOp::NoNewPrivs),
            OP_RESTRICT_SELF => Some(ThreadOp::RestrictSelf {
                ruleset: OP_FD.load(Ordering::Acquire),
                flags: OP_FLAGS.load(Ordering::Acquire),
            }),
            _ => None,
        }
    }

    // Runs in signal context: atomics and raw syscalls only.
    fn on_signal() {
        let saved = Errno::last_raw();
        if gettid() == TARGET.load(Ordering::Acquire) {
            if let Some(op) = published() {
                let generation = GENERATION.load(Ordering::Acquire);
                let errno = match op.run() {
                    Ok(()) => 0,
                    Err(e) => e as i32,
                };
                REPLY.store(
                    (u64::from(generation) << 32) | u64::from(errno as u32),
                    Ordering::Release,
                );
            }
        }
        Errno::set_raw(saved);
    }

    fn install_handler() -> Result<(), Errno> {
        *HANDLER.get_or_init(|| {
            // SAFETY: on_signal only touches atomics and issues raw syscalls,
            // all of which are async-signal-safe.
            unsafe { signal_hook::low_level::register(signal(), on_signal) }
                .map(drop)
                .map_err(|e| e.raw_os_error().map_or(Errno::EINVAL, Errno::from_raw))
        })
    }

    pub(super) fn signal() -> libc::c_int {
        libc::SIGRTMAX()
    }

    pub(super) fn gettid() -> libc::pid_t {
        // SAFETY: gettid takes no arguments and cannot fail.
        unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t }
    }

    fn tgkill(pid: libc::pid_t, tid: libc::pid_t, sig: libc::c_int) -> Result<(), Errno> {
        // SAFETY: plain integer arguments.
        Errno::result(unsafe { libc::syscall(libc::SYS_tgkill, pid, tid, sig) }).map(drop)
    }

    pub(super) fn open_tasks() -> Result<Dir, Errno> {
        Dir::open(
            "/proc/self/task",
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
    }

    // Each call starts over from the first entry: the iterator rewinds the
    // directory when dropped.
    pub(super) fn task_ids(tasks: &mut Dir) -> Result<Vec<libc::pid_t>, Errno> {
        let mut ids = Vec::new();
        for entry in tasks.iter() {
            let entry = entry?;
            if let Some(tid) = entry.file_name().to_str().ok().and_then(|s| s.parse().ok()) {
                ids.push(tid);
            }
        }
        Ok(ids)
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use nix::errno::Errno;

    use super::ThreadOp;

    pub fn all_threads(_op: ThreadOp) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;

    fn no_new_privs() -> bool {
        // SAFETY: plain integer arguments.
        unsafe { libc::prctl(libc::PR_GET_NO_NEW_PRIVS, 0, 0, 0, 0) == 1 }
    }

    #[test]
    fn task_list_contains_current_thread() {
        let mut tasks = platform::open_tasks().unwrap();
        let ids = platform::task_ids(&mut tasks).unwrap();
        assert!(ids.contains(&platform::gettid()));
    }

    #[test]
    fn task_list_can_be_read_again_through_the_same_handle() {
        let mut tasks = platform::open_tasks().unwrap();
        let first = platform::task_ids(&mut tasks).unwrap();
        let second = platform::task_ids(&mut tasks).unwrap();
        assert!(!first.is_empty());
        assert!(second.contains(&platform::gettid()));
    }

    #[test]
    fn broadcast_signal_is_realtime() {
        assert!(platform::signal() >= libc::SIGRTMIN());
    }

    // Sets no_new_privs on the test process, which is harmless for the
    // remaining tests.
    #[test]
    fn no_new_privs_reaches_threads_started_before_the_call() {
        const THREADS: usize = 4;
        let ready = Arc::new(Barrier::new(THREADS + 1));
        let applied = Arc::new(Barrier::new(THREADS + 1));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let ready = Arc::clone(&ready);
                let applied = Arc::clone(&applied);
                thread::spawn(move || {
                    ready.wait();
                    applied.wait();
                    no_new_privs()
                })
            })
            .collect();

        ready.wait();
        all_threads(ThreadOp::NoNewPrivs).unwrap();
        assert!(no_new_privs());
        applied.wait();

        for worker in workers {
            assert!(worker.join().unwrap(), "worker thread missed no_new_privs");
        }
    }
}
