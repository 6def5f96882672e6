use fibre_memo::{BoxError, CacheBuilder, RemovalNotification};
use std::thread;
use std::time::Duration;

/// Stands in for an expensive computation, e.g. reading a graph from disk.
fn load_graph(id: &u32) -> Result<String, BoxError> {
  thread::sleep(Duration::from_millis(200));
  if *id == 13 {
    return Err(format!("graph {id} is corrupt").into());
  }
  Ok(format!("graph-{id}"))
}

fn main() {
  let graphs = CacheBuilder::<u32, String>::default()
    .maximum_size(2)
    .expire_after_write(Duration::from_secs(10 * 60))
    .record_stats()
    .removal_listener(
      |n: RemovalNotification<u32, String>| -> Result<(), BoxError> {
        println!("Removed {} ({}), cause: {}", n.key(), n.value(), n.cause());
        Ok(())
      },
    )
    .build_with_loader(load_graph)
    .expect("Failed to build cache");

  // Four threads ask for the same graph at once; it is loaded once.
  thread::scope(|s| {
    for _ in 0..4 {
      s.spawn(|| {
        let graph = graphs.get(1).expect("graph 1 loads");
        println!("Got {graph}");
      });
    }
  });

  graphs.get(2).expect("graph 2 loads");
  // Loading a third graph evicts the least recently used one.
  graphs.get(3).expect("graph 3 loads");

  match graphs.get(13) {
    Ok(graph) => println!("Unexpectedly got {graph}"),
    Err(error) => println!("Loading graph 13 failed: {error}"),
  }

  graphs.invalidate(&3);

  println!("\nCache size: {}", graphs.size());
  println!("Cache stats: {:#?}", graphs.stats());
}
