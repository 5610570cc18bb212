use std::{
    thread,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use threadpool::ThreadPool;


/// A unit of periodic background work. Runs on the shared pool; a slow run
/// never overlaps with itself, it just delays its own next slot.
pub struct Job {
    work: Arc<dyn Fn() + Send + Sync + 'static>,
    period: Duration,
}

impl Job {
    pub fn new<F>(work: F, period: Duration) -> Self where
        F: Fn() + Send + Sync + 'static {

        Job {
            work: Arc::new(work),
            period,
        }
    }
}


struct Scheduled {
    job: Job,
    next_time: Instant,
    busy: Arc<Mutex<bool>>,
}

impl Scheduled {
    fn new(job: Job) -> Self {
        let next_time = Instant::now() + job.period;

        Scheduled {
            job,
            next_time,
            busy: Arc::new(Mutex::new(false)),
        }
    }

    fn ready(&self) -> bool {
        !*self.busy.lock().unwrap() && Instant::now() >= self.next_time
    }
}


pub struct JobRunnerBuilder {
    jobs: Vec<Job>,
    n_workers: usize,
    tick: Duration,
}

impl JobRunnerBuilder {
    pub fn new() -> Self {
        JobRunnerBuilder {
            jobs: Vec::new(),
            n_workers: 2,
            tick: Duration::new(1, 0),
        }
    }

    pub fn n_workers(mut self, cnt: usize) -> Self {
        self.n_workers = cnt;
        self
    }

    pub fn add_job(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn build(self) -> JobRunner {
        JobRunner::start(self)
    }
}


pub struct JobRunner {
    handle: thread::JoinHandle<()>,
    running: Arc<Mutex<bool>>,
}

impl JobRunner {
    fn start(builder: JobRunnerBuilder) -> Self {
        let mut scheduled = builder.jobs.into_iter()
            .map(Scheduled::new)
            .collect::<Vec<_>>();
        let n_workers = builder.n_workers;
        let tick = builder.tick;

        let t_running = Arc::new(Mutex::new(true));
        let running = t_running.clone();

        let runner_loop = move || {
            let pool = ThreadPool::new(n_workers);

            while *running.lock().unwrap() {
                for entry in &mut scheduled {
                    if entry.ready() {
                        *entry.busy.lock().unwrap() = true;
                        entry.next_time = Instant::now() + entry.job.period;

                        let work = entry.job.work.clone();
                        let busy = entry.busy.clone();
                        pool.execute(move || {
                            work();
                            *busy.lock().unwrap() = false;
                        });
                    }
                }

                thread::sleep(tick);
            }

            pool.join();
        };

        JobRunner {
            handle: thread::spawn(runner_loop),
            running: t_running,
        }
    }

    pub fn shutdown(self) {
        {
            let mut running = self.running.lock().unwrap();

            if !*running {
                return;
            }

            *running = false;
        }

        self.handle.join().unwrap();
    }
}
