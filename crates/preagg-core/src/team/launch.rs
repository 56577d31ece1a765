use crate::{
    error::InternalError,
    team::{BarrierBroken, MAX_TEAM_SIZE, TeamContext, TeamShared},
};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Condvar, Mutex, PoisonError},
    thread,
};

///
/// NdRange
///
/// Launch geometry: `num_teams` teams of `team_size` members.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NdRange {
    pub team_size: u32,
    pub num_teams: u32,
    pub global_size: u32,
}

impl NdRange {
    /// Smallest range covering `nitems` work items; always at least one team.
    pub fn for_items(nitems: u32, team_size: u32) -> Result<Self, InternalError> {
        if team_size == 0 || team_size > MAX_TEAM_SIZE {
            return Err(InternalError::config_unsupported(format!(
                "team size {team_size} is outside 1..={MAX_TEAM_SIZE}"
            )));
        }
        let num_teams = nitems.div_ceil(team_size).max(1);
        let global_size = num_teams
            .checked_mul(team_size)
            .ok_or_else(|| InternalError::runtime_internal("launch range overflows u32"))?;

        Ok(Self {
            team_size,
            num_teams,
            global_size,
        })
    }
}

///
/// LaunchGate
///
/// Holds members back until the whole team is spawned. A closed gate
/// tells members to exit without entering the kernel.
///

#[derive(Debug, Default)]
struct LaunchGate {
    open: Mutex<Option<bool>>,
    ready: Condvar,
}

impl LaunchGate {
    fn settle(&self, open: bool) {
        let mut state = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        *state = Some(open);
        self.ready.notify_all();
    }

    fn wait(&self) -> bool {
        let mut state = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(open) = *state {
                return open;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

///
/// TeamLauncher
///
/// Runs one kernel over an `NdRange`. Teams are spread over a crate-local
/// rayon pool; each team's members are scoped OS threads so barriers can
/// block without starving the pool.
///

#[derive(Debug)]
pub struct TeamLauncher {
    pool: ThreadPool,
}

impl TeamLauncher {
    /// Build a launcher running up to `max_concurrent_teams` teams at once,
    /// falling back to one team at a time if the pool cannot be built.
    pub fn new(max_concurrent_teams: usize) -> Result<Self, InternalError> {
        let requested = max_concurrent_teams.max(1);
        let try_build = |threads: usize| {
            ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|index| format!("preagg-team-{index}"))
                .build()
        };

        let pool = match try_build(requested) {
            Ok(pool) => pool,
            Err(_) if requested > 1 => try_build(1).map_err(|err| {
                InternalError::runtime_internal(format!("team pool unavailable: {err}"))
            })?,
            Err(err) => {
                return Err(InternalError::runtime_internal(format!(
                    "team pool unavailable: {err}"
                )));
            }
        };

        Ok(Self { pool })
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `kernel` once per member of every team in `range`.
    pub fn launch<K>(&self, range: NdRange, kernel: &K) -> Result<(), InternalError>
    where
        K: Fn(&TeamContext<'_>) + Sync,
    {
        self.pool.install(|| {
            (0..range.num_teams)
                .into_par_iter()
                .try_for_each(|team_id| run_team(range, team_id, kernel))
        })
    }
}

///
/// MemberExit
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MemberExit {
    Finished,
    Skipped,
    Panicked,
    Released,
}

// A member that unwinds breaks the team barrier so no teammate waits on it.
fn run_member<K>(ctx: &TeamContext<'_>, kernel: &K) -> MemberExit
where
    K: Fn(&TeamContext<'_>) + Sync,
{
    match panic::catch_unwind(AssertUnwindSafe(|| kernel(ctx))) {
        Ok(()) => MemberExit::Finished,
        Err(payload) => {
            ctx.shared().abort();
            if payload.is::<BarrierBroken>() {
                MemberExit::Released
            } else {
                MemberExit::Panicked
            }
        }
    }
}

fn run_team<K>(range: NdRange, team_id: u32, kernel: &K) -> Result<(), InternalError>
where
    K: Fn(&TeamContext<'_>) + Sync,
{
    let shared = TeamShared::new(range.team_size);
    let gate = LaunchGate::default();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(range.team_size as usize);
        let mut spawn_error = None;

        for local_id in 0..range.team_size {
            let (shared, gate) = (&shared, &gate);
            let spawned = thread::Builder::new()
                .name(format!("preagg-{team_id}-{local_id}"))
                .spawn_scoped(scope, move || {
                    if !gate.wait() {
                        return MemberExit::Skipped;
                    }
                    run_member(&TeamContext::new(shared, range, team_id, local_id), kernel)
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    spawn_error = Some(err);
                    break;
                }
            }
        }
        gate.settle(spawn_error.is_none());

        let panicked = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(MemberExit::Panicked))
            .filter(|exit| *exit == MemberExit::Panicked)
            .count();

        if let Some(err) = spawn_error {
            return Err(InternalError::runtime_internal(format!(
                "team {team_id} could not spawn all {} members: {err}",
                range.team_size
            )));
        }
        if panicked > 0 {
            return Err(InternalError::runtime_internal(format!(
                "{panicked} members of team {team_id} panicked"
            )));
        }

        Ok(())
    })
}
