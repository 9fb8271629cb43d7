mod logger;

use kernel_pagepool::config::DEFAULT_POOLS;
use kernel_pagepool::{
    AllocClass, PagePoolConfig, PageSource, PoolAllocator, ReplenishDaemon, SegregatedPageSource,
    Zone,
};
use kernel_sync::Clock;
use log::{LevelFilter, info};
use logger::StderrLogger;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const CALLERS: usize = 4;
/// Blocks a caller keeps before handing the oldest back upstream.
const HELD_PER_CALLER: usize = 24;
const REGION_PAGES: u64 = 1 << 20;

struct HostClock(Instant);

impl Clock for HostClock {
    fn now(&self) -> Duration {
        self.0.elapsed()
    }

    fn relax(&self) {
        thread::sleep(Duration::from_micros(500));
    }
}

fn arg_or<T: std::str::FromStr>(arg: Option<String>, default: T) -> io::Result<T> {
    match arg {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| io::Error::other(format!("not a number: {s}"))),
    }
}

fn main() -> io::Result<()> {
    // args: [run_millis] [seed_blocks_per_order]
    let mut args = std::env::args().skip(1);
    let run_for = Duration::from_millis(arg_or(args.next(), 500)?);
    let seed: usize = arg_or(args.next(), 1024)?;

    StderrLogger::new(LevelFilter::Debug)
        .init()
        .map_err(io::Error::other)?;

    let source = SegregatedPageSource::new(0x10_0000, REGION_PAGES);
    for pool in &DEFAULT_POOLS {
        let carved = source.seed(pool.order, seed);
        info!("seeded {carved} order-{} blocks", pool.order);
    }

    let config = PagePoolConfig {
        period: Duration::from_millis(20),
        ..PagePoolConfig::default()
    };
    let pools = Arc::new(PoolAllocator::new(&config, source).map_err(io::Error::other)?);
    let daemon = Arc::new(ReplenishDaemon::new(Arc::clone(&pools)));

    let replenisher = {
        let daemon = Arc::clone(&daemon);
        thread::Builder::new()
            .name("pool-replenish".into())
            .spawn(move || daemon.run(&HostClock(Instant::now())))?
    };

    let running = Arc::new(AtomicBool::new(true));
    let callers = (0..CALLERS)
        .map(|id| {
            let pools = Arc::clone(&pools);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name(format!("caller-{id}"))
                .spawn(move || caller(id, &pools, &running))
        })
        .collect::<io::Result<Vec<_>>>()?;

    thread::sleep(run_for / 2);
    pools.write_control(b"0");
    print!("{}", pools.dump_status());
    thread::sleep(run_for / 10);
    pools.write_control(b"1");
    thread::sleep(run_for / 2);

    running.store(false, Ordering::Release);
    let mut served = 0;
    for h in callers {
        served += h.join().map_err(|_| io::Error::other("caller panicked"))?;
    }
    info!("callers were served {served} blocks");

    // Let the replenisher catch up before the final snapshot.
    pools.kick();
    thread::sleep(config.period * 3);
    print!("{}", pools.dump_status());

    daemon.request_stop();
    replenisher
        .join()
        .map_err(|_| io::Error::other("replenisher panicked"))?;
    pools.set_enabled(false);
    info!("released {} pooled blocks", pools.release_all());
    Ok(())
}

/// Allocate in bursts, keep a window of blocks, and return the oldest upstream.
fn caller(id: usize, pools: &PoolAllocator<SegregatedPageSource>, running: &AtomicBool) -> usize {
    let orders: Vec<u32> = DEFAULT_POOLS.iter().map(|p| p.order).collect();
    let mut held = VecDeque::with_capacity(HELD_PER_CALLER + 1);
    let mut served = 0;
    let mut tick = id;

    while running.load(Ordering::Acquire) {
        tick = tick.wrapping_add(1);
        let order = orders[tick % orders.len()];
        if let Some(block) = pools.try_alloc(order, AllocClass::Standard, Zone::Normal) {
            served += 1;
            held.push_back(block);
        }
        if held.len() > HELD_PER_CALLER
            && let Some(oldest) = held.pop_front()
        {
            pools.source().release_block(oldest);
        }
        if tick % 64 == 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }

    for block in held {
        pools.source().release_block(block);
    }
    served
}
