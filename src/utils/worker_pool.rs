// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;

use anyhow::Result;
use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::thread::scope;

/// Run `workers` over the items of `in_receiver` and feed their results to
/// `postprocessor` in input order. Loci are independent, so this is the
/// caller-side way to parallelize across loci while each genotyper instance
/// stays single-threaded.
pub fn worker_pool<P, W, WS, U, T>(
    in_receiver: Receiver<U>,
    workers: WS,
    postprocessor: P,
    out_capacity: usize,
) -> Result<()>
where
    P: FnMut(T) -> Result<()> + Send,
    WS: Iterator<Item = W>,
    W: FnOnce(Receiver<U>, Sender<T>) -> Result<()> + Send,
    T: Send + Orderable,
    U: Send,
{
    scope(|scope| -> Result<()> {
        let (out_sender, out_receiver) = bounded(out_capacity);

        let workers: Vec<_> = workers
            .map(|worker| {
                let in_receiver = in_receiver.clone();
                let out_sender = out_sender.clone();
                scope.spawn(move |_| worker(in_receiver, out_sender))
            })
            .collect();
        drop(out_sender);

        let postprocessor = scope.spawn(move |_| -> Result<()> {
            let mut postprocessor = postprocessor;
            let mut items = OrderedContainer::new();
            let mut last_index = None;

            for item in out_receiver {
                items.insert(item.index(), item);

                // Find continuous prefix, postprocess in order.
                for item in items.remove_continuous_prefix(&mut last_index) {
                    postprocessor(item)?;
                }
            }

            Ok(())
        });

        for worker in workers {
            worker.join().expect("worker thread panicked")?;
        }
        postprocessor.join().expect("postprocessor thread panicked")?;

        Ok(())
    })
    .expect("worker pool thread panicked")?;

    Ok(())
}

pub trait Orderable {
    fn index(&self) -> usize;
}

struct OrderedContainer<T> {
    inner: BTreeMap<usize, T>,
}

impl<T> OrderedContainer<T>
where
    T: Orderable,
{
    fn new() -> Self {
        OrderedContainer {
            inner: BTreeMap::new(),
        }
    }

    fn insert(&mut self, key: usize, value: T) {
        self.inner.insert(key, value);
    }

    fn remove_continuous_prefix(&mut self, last_index: &mut Option<usize>) -> Vec<T> {
        let mut items = Vec::new();
        loop {
            let next = match last_index {
                Some(last) => *last + 1,
                None => 0,
            };
            match self.inner.remove(&next) {
                Some(item) => {
                    items.push(item);
                    last_index.replace(next);
                }
                None => break,
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[derive(Debug)]
    struct Item {
        index: usize,
        value: usize,
    }

    impl Orderable for Item {
        fn index(&self) -> usize {
            self.index
        }
    }

    #[test]
    fn test_results_arrive_in_input_order() {
        let (in_sender, in_receiver) = unbounded();
        for index in 0..20 {
            in_sender.send(index).unwrap();
        }
        drop(in_sender);

        let mut collected = Vec::new();
        let workers = (0..4).map(|_| {
            |in_receiver: Receiver<usize>, out_sender: Sender<Item>| -> Result<()> {
                for index in in_receiver {
                    out_sender
                        .send(Item {
                            index,
                            value: index * index,
                        })
                        .unwrap();
                }
                Ok(())
            }
        });
        worker_pool(
            in_receiver,
            workers,
            |item: Item| {
                collected.push((item.index, item.value));
                Ok(())
            },
            8,
        )
        .unwrap();

        assert_eq!(collected.len(), 20);
        for (i, (index, value)) in collected.iter().enumerate() {
            assert_eq!(*index, i);
            assert_eq!(*value, i * i);
        }
    }
}
