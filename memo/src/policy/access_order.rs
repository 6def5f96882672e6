use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Link<K> {
  key: K,
  prev: Option<Index>,
  next: Option<Index>,
}

/// Recency order of the keys in one shard.
///
/// Nodes live in an arena and each cache entry remembers its own node index,
/// so touching or removing an entry is O(1) without a second key lookup.
/// The front is the least recently used key, the back the most recent.
#[derive(Debug)]
pub(crate) struct AccessOrder<K> {
  links: Arena<Link<K>>,
  front: Option<Index>,
  back: Option<Index>,
}

impl<K> AccessOrder<K> {
  pub(crate) fn new() -> Self {
    Self {
      links: Arena::new(),
      front: None,
      back: None,
    }
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.links.len()
  }

  /// Appends a key as the most recently used and returns its node.
  pub(crate) fn push_back(&mut self, key: K) -> Index {
    let index = self.links.insert(Link {
      key,
      prev: None,
      next: None,
    });
    self.link_back(index);
    index
  }

  /// Marks a node as the most recently used.
  pub(crate) fn touch(&mut self, index: Index) {
    if self.back == Some(index) || !self.links.contains(index) {
      return;
    }
    self.unlink(index);
    self.link_back(index);
  }

  /// Removes a node, returning its key.
  pub(crate) fn remove(&mut self, index: Index) -> Option<K> {
    if !self.links.contains(index) {
      return None;
    }
    self.unlink(index);
    self.links.remove(index).map(|link| link.key)
  }

  /// The least recently used node.
  pub(crate) fn front(&self) -> Option<Index> {
    self.front
  }

  /// The node used just after `index`, if any.
  pub(crate) fn next(&self, index: Index) -> Option<Index> {
    self.links.get(index).and_then(|link| link.next)
  }

  pub(crate) fn clear(&mut self) {
    self.links.clear();
    self.front = None;
    self.back = None;
  }

  fn link_back(&mut self, index: Index) {
    let old_back = self.back;
    if let Some(link) = self.links.get_mut(index) {
      link.prev = old_back;
      link.next = None;
    }
    match old_back.and_then(|back| self.links.get_mut(back)) {
      Some(back) => back.next = Some(index),
      None => self.front = Some(index),
    }
    self.back = Some(index);
  }

  fn unlink(&mut self, index: Index) {
    let (prev, next) = match self.links.get(index) {
      Some(link) => (link.prev, link.next),
      None => return,
    };

    match prev.and_then(|prev| self.links.get_mut(prev)) {
      Some(prev_link) => prev_link.next = next,
      None => self.front = next,
    }
    match next.and_then(|next| self.links.get_mut(next)) {
      Some(next_link) => next_link.prev = prev,
      None => self.back = prev,
    }
  }

  // Keys from least to most recently used, for tests.
  #[cfg(test)]
  pub(crate) fn keys(&self) -> Vec<K>
  where
    K: Clone,
  {
    let mut keys = Vec::with_capacity(self.len());
    let mut current = self.front;
    while let Some(index) = current {
      let link = &self.links[index];
      keys.push(link.key.clone());
      current = link.next;
    }
    keys
  }
}
