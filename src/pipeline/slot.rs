//! Slots: the typed connection points of a module.
//!
//! Each module declares its slots via static `SlotDescriptor` arrays. An
//! output slot owns an [`ImageChannel`] (a mutex around the current image)
//! from construction on. Connecting an input slot to an output makes the
//! input share that channel, so a producer and all of its readers serialize
//! through one lock per produced image. An input slot is connected to at most
//! one output; an output may fan out to many inputs.

use crate::error::{KernelError, Result};
use crate::image::Image;
use crate::pipeline::id::ModuleId;
use crate::pipeline::module::Module;
use parking_lot::{ArcMutexGuard, Mutex, MutexGuard, RawMutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Shared cell holding the image most recently produced on an output slot.
pub type ImageChannel = Arc<Mutex<Option<Image>>>;

/// Owned lock on an [`ImageChannel`]. Dropping it unlocks the channel.
pub type ImageGuard = ArcMutexGuard<RawMutex, Option<Image>>;

/// Whether a slot consumes or produces images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Input,
    Output,
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotKind::Input => write!(f, "input"),
            SlotKind::Output => write!(f, "output"),
        }
    }
}

/// Static descriptor for a module's slot.
#[derive(Debug, Clone)]
pub struct SlotDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub kind: SlotKind,
}

impl SlotDescriptor {
    pub const fn input(
        name: &'static str,
        display_name: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            display_name,
            description,
            kind: SlotKind::Input,
        }
    }

    pub const fn output(
        name: &'static str,
        display_name: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            display_name,
            description,
            kind: SlotKind::Output,
        }
    }
}

#[derive(Default)]
struct SlotLink {
    /// Output: always the owned channel. Input: the connected output's channel.
    channel: Option<ImageChannel>,
    peers: Vec<Weak<Slot>>,
}

/// A live slot owned by a [`Module`].
pub struct Slot {
    descriptor: SlotDescriptor,
    owner: Weak<Module>,
    owner_id: ModuleId,
    link: Mutex<SlotLink>,
    use_count: AtomicUsize,
}

impl Slot {
    pub(crate) fn new(descriptor: SlotDescriptor, owner: Weak<Module>, owner_id: ModuleId) -> Self {
        let channel = match descriptor.kind {
            SlotKind::Output => Some(Arc::new(Mutex::new(None))),
            SlotKind::Input => None,
        };
        Self {
            descriptor,
            owner,
            owner_id,
            link: Mutex::new(SlotLink {
                channel,
                peers: Vec::new(),
            }),
            use_count: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn display_name(&self) -> &'static str {
        self.descriptor.display_name
    }

    pub fn description(&self) -> &'static str {
        self.descriptor.description
    }

    pub fn kind(&self) -> SlotKind {
        self.descriptor.kind
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.descriptor.kind == SlotKind::Input
    }

    #[inline]
    pub fn is_output(&self) -> bool {
        self.descriptor.kind == SlotKind::Output
    }

    /// The module owning this slot, if it is still alive.
    pub fn owner(&self) -> Option<Arc<Module>> {
        self.owner.upgrade()
    }

    pub fn owner_id(&self) -> ModuleId {
        self.owner_id
    }

    /// `label.slot`, used in error messages and cycle paths.
    pub fn qualified_name(&self) -> String {
        match self.owner.upgrade() {
            Some(module) => format!("{}.{}", module.label(), self.descriptor.name),
            None => format!("<detached>.{}", self.descriptor.name),
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.link.lock().peers.is_empty()
    }

    /// Number of active producer/consumer relationships and monitors on this slot.
    pub fn use_count(&self) -> usize {
        self.use_count.load(Ordering::Acquire)
    }

    /// Register one more consumer (e.g. a monitor) of this slot.
    pub fn acquire_use(&self) {
        self.use_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Release a use taken with [`Slot::acquire_use`].
    pub fn release_use(&self) {
        let _ = self
            .use_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Slots currently connected to this one.
    pub fn peers(&self) -> Vec<Arc<Slot>> {
        self.link
            .lock()
            .peers
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn is_connected_to(&self, other: &Slot) -> bool {
        let other_ptr = other as *const Slot;
        self.link
            .lock()
            .peers
            .iter()
            .any(|w| std::ptr::eq(w.as_ptr(), other_ptr))
    }

    // ── Connection protocol ──

    /// Connect an input slot with an output slot, in either argument order.
    ///
    /// On failure neither slot is modified.
    pub fn connect(a: &Arc<Slot>, b: &Arc<Slot>) -> Result<()> {
        if a.kind() == b.kind() {
            return Err(KernelError::InvalidSlot(format!(
                "cannot connect {} slot {} to {} slot {}",
                a.kind(),
                a.qualified_name(),
                b.kind(),
                b.qualified_name()
            )));
        }
        let (input, output) = if a.is_input() { (a, b) } else { (b, a) };

        let (mut in_link, mut out_link) = lock_pair(input, output);
        if !in_link.peers.is_empty() {
            drop((in_link, out_link));
            return Err(KernelError::AlreadyConnectedSlot(input.qualified_name()));
        }
        let channel = match out_link.channel.clone() {
            Some(channel) => channel,
            None => {
                drop((in_link, out_link));
                return Err(KernelError::InvalidSlot(format!(
                    "output slot {} has no image channel",
                    output.qualified_name()
                )));
            }
        };

        in_link.channel = Some(channel);
        in_link.peers.push(Arc::downgrade(output));
        out_link.peers.push(Arc::downgrade(input));
        input.acquire_use();
        output.acquire_use();
        drop((in_link, out_link));

        tracing::trace!(
            "Connected {} -> {}",
            output.qualified_name(),
            input.qualified_name()
        );
        Ok(())
    }

    /// Tear down the connection between `a` and `b`.
    ///
    /// The link is checked under both slot locks, so racing disconnects of the
    /// same pair release the use counts once.
    pub fn disconnect(a: &Arc<Slot>, b: &Arc<Slot>) -> Result<()> {
        let not_connected = || {
            KernelError::NotConnectedSlot(format!(
                "{} is not connected to {}",
                a.qualified_name(),
                b.qualified_name()
            ))
        };
        if a.kind() == b.kind() {
            return Err(not_connected());
        }
        let (input, output) = if a.is_input() { (a, b) } else { (b, a) };

        let (mut in_link, mut out_link) = lock_pair(input, output);
        let input_ptr = Arc::as_ptr(input);
        let output_ptr = Arc::as_ptr(output);
        let linked = in_link.peers.iter().any(|w| std::ptr::eq(w.as_ptr(), output_ptr));
        if !linked {
            drop((in_link, out_link));
            return Err(not_connected());
        }
        in_link.channel = None;
        in_link.peers.clear();
        out_link.peers.retain(|w| !std::ptr::eq(w.as_ptr(), input_ptr));
        input.release_use();
        output.release_use();
        drop((in_link, out_link));

        tracing::trace!(
            "Disconnected {} -> {}",
            output.qualified_name(),
            input.qualified_name()
        );
        Ok(())
    }

    /// Disconnect every peer of this slot. No-op on an unconnected slot.
    pub fn disconnect_all(self: &Arc<Self>) {
        for peer in self.peers() {
            if let Err(e) = Slot::disconnect(self, &peer) {
                tracing::warn!("Failed to disconnect {}: {}", self.qualified_name(), e);
            }
        }
    }

    // ── Image access ──

    fn channel(&self) -> Result<ImageChannel> {
        self.link
            .lock()
            .channel
            .clone()
            .ok_or_else(|| KernelError::NotConnectedSlot(self.qualified_name()))
    }

    /// Block until the slot's image channel is free and lock it.
    pub fn lock(&self) -> Result<ImageGuard> {
        Ok(self.channel()?.lock_arc())
    }

    /// Lock the image channel if it is free right now.
    pub fn try_lock(&self) -> Result<Option<ImageGuard>> {
        Ok(self.channel()?.try_lock_arc())
    }

    /// Whether an image has been produced yet. False on a disconnected input.
    pub fn has_image(&self) -> bool {
        self.channel().map(|c| c.lock().is_some()).unwrap_or(false)
    }

    /// Copy the current image out under the lock.
    pub fn image_snapshot(&self) -> Result<Option<Image>> {
        Ok(self.lock()?.clone())
    }

    /// Replace the image on an output slot.
    pub fn set_image(&self, image: Image) -> Result<()> {
        if !self.is_output() {
            return Err(KernelError::InvalidSlot(format!(
                "cannot write an image to input slot {}",
                self.qualified_name()
            )));
        }
        *self.lock()? = Some(image);
        Ok(())
    }

    /// Drop the image held by an output slot.
    pub fn clear_image(&self) {
        if self.is_output() {
            if let Ok(mut guard) = self.lock() {
                *guard = None;
            }
        }
    }
}

/// Lock two slot links in address order so concurrent connects cannot deadlock.
fn lock_pair<'a>(
    first: &'a Arc<Slot>,
    second: &'a Arc<Slot>,
) -> (MutexGuard<'a, SlotLink>, MutexGuard<'a, SlotLink>) {
    if Arc::as_ptr(first) < Arc::as_ptr(second) {
        let a = first.link.lock();
        let b = second.link.lock();
        (a, b)
    } else {
        let b = second.link.lock();
        let a = first.link.lock();
        (a, b)
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let me = self as *const Slot;
        let is_output = self.is_output();
        let peers = std::mem::take(&mut self.link.get_mut().peers);
        for peer in peers.iter().filter_map(Weak::upgrade) {
            let mut link = peer.link.lock();
            link.peers.retain(|w| !std::ptr::eq(w.as_ptr(), me));
            if is_output {
                link.channel = None;
            }
            drop(link);
            peer.release_use();
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("name", &self.descriptor.name)
            .field("kind", &self.descriptor.kind)
            .field("owner", &self.owner_id)
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::image::Depth;

    fn slot(kind: SlotKind) -> Arc<Slot> {
        let descriptor = match kind {
            SlotKind::Input => SlotDescriptor::input("in", "In", ""),
            SlotKind::Output => SlotDescriptor::output("out", "Out", ""),
        };
        Arc::new(Slot::new(descriptor, Weak::new(), ModuleId(0)))
    }

    #[test]
    fn test_output_is_lockable_before_connection() {
        let out = slot(SlotKind::Output);
        assert!(!out.is_connected());
        assert!(out.lock().is_ok());
        assert!(!out.has_image());
    }

    #[test]
    fn test_unconnected_input_lock_fails() {
        let input = slot(SlotKind::Input);
        let err = input.lock().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotConnectedSlot);
        assert_eq!(input.try_lock().err().unwrap().kind(), ErrorKind::NotConnectedSlot);
    }

    #[test]
    fn test_connect_shares_channel() {
        let out = slot(SlotKind::Output);
        let input = slot(SlotKind::Input);
        Slot::connect(&input, &out).unwrap();

        out.set_image(Image::new(2, 2, Depth::U8, 1).unwrap()).unwrap();
        let seen = input.image_snapshot().unwrap().unwrap();
        assert_eq!(seen.width(), 2);

        let guard = out.lock().unwrap();
        assert!(input.try_lock().unwrap().is_none());
        drop(guard);
        assert!(input.try_lock().unwrap().is_some());
    }

    #[test]
    fn test_fan_out() {
        let out = slot(SlotKind::Output);
        let a = slot(SlotKind::Input);
        let b = slot(SlotKind::Input);
        Slot::connect(&out, &a).unwrap();
        Slot::connect(&out, &b).unwrap();
        assert_eq!(out.peers().len(), 2);
        assert_eq!(out.use_count(), 2);

        Slot::disconnect(&a, &out).unwrap();
        assert!(out.is_connected());
        Slot::disconnect(&out, &b).unwrap();
        assert!(!out.is_connected());
        assert_eq!(out.use_count(), 0);
    }

    #[test]
    fn test_racing_disconnects_release_once() {
        for _ in 0..200 {
            let out = slot(SlotKind::Output);
            let input = slot(SlotKind::Input);
            let other = slot(SlotKind::Input);
            Slot::connect(&out, &input).unwrap();
            Slot::connect(&out, &other).unwrap();

            let barrier = Arc::new(std::sync::Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let (out, input, barrier) = (out.clone(), input.clone(), barrier.clone());
                    std::thread::spawn(move || {
                        barrier.wait();
                        Slot::disconnect(&out, &input).is_ok()
                    })
                })
                .collect();
            let succeeded = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();

            assert_eq!(succeeded, 1);
            assert_eq!(input.use_count(), 0);
            assert_eq!(out.use_count(), 1);
            assert!(other.is_connected_to(&out));
        }
    }

    #[test]
    fn test_disconnect_wrong_pair_keeps_link() {
        let out = slot(SlotKind::Output);
        let other_out = slot(SlotKind::Output);
        let input = slot(SlotKind::Input);
        Slot::connect(&out, &input).unwrap();

        let err = Slot::disconnect(&other_out, &input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnectedSlot);
        assert!(input.is_connected_to(&out));
        assert_eq!(input.use_count(), 1);
        assert!(input.lock().is_ok());
    }

    #[test]
    fn test_same_kind_rejected() {
        let a = slot(SlotKind::Output);
        let b = slot(SlotKind::Output);
        assert_eq!(Slot::connect(&a, &b).unwrap_err().kind(), ErrorKind::InvalidSlot);
        assert!(!a.is_connected() && !b.is_connected());
    }

    #[test]
    fn test_disconnect_all_is_noop_when_unconnected() {
        let input = slot(SlotKind::Input);
        input.disconnect_all();
        assert!(!input.is_connected());
    }

    #[test]
    fn test_dropping_output_detaches_inputs() {
        let out = slot(SlotKind::Output);
        let input = slot(SlotKind::Input);
        Slot::connect(&out, &input).unwrap();
        drop(out);
        assert!(!input.is_connected());
        assert_eq!(input.use_count(), 0);
        assert_eq!(input.lock().err().unwrap().kind(), ErrorKind::NotConnectedSlot);
    }

    #[test]
    fn test_set_image_on_input_rejected() {
        let input = slot(SlotKind::Input);
        let img = Image::new(1, 1, Depth::U8, 1).unwrap();
        assert_eq!(input.set_image(img).unwrap_err().kind(), ErrorKind::InvalidSlot);
    }
}
