use kernel_alloc::fatal::{OrFatal, PanicOnFatal};
use kernel_alloc::frame_alloc::{BitmapFrameAlloc, FrameAllocError};
use kernel_memory_addresses::{FrameNumber, PhysicalAddress};

#[test]
fn sixteen_frames_allocate_and_recover() {
    let mut bitmap = [0u8; 2];
    let mut frames = BitmapFrameAlloc::new(&mut bitmap, 16).unwrap();

    assert_eq!(frames.alloc(3).or_fatal(&PanicOnFatal), PhysicalAddress::zero());
    assert!(frames.check(FrameNumber::new(0), 3));
    assert!(!frames.check(FrameNumber::new(3), 13));
    assert_eq!(frames.alloc(16), Err(FrameAllocError::OutOfFrames(16)));

    frames.free(FrameNumber::new(0), 3).or_fatal(&PanicOnFatal);
    assert_eq!(frames.alloc(16).or_fatal(&PanicOnFatal), PhysicalAddress::zero());
    assert_eq!(frames.free_frames(), 0);
    drop(frames);
    assert_eq!(bitmap, [0xFF, 0xFF]);
}

#[test]
#[should_panic(expected = "KERNEL PANIC: no run of 16 free frames")]
fn exhaustion_is_fatal() {
    let mut bitmap = [0u8; 2];
    let mut frames = BitmapFrameAlloc::new(&mut bitmap, 16).unwrap();
    frames.alloc(3).or_fatal(&PanicOnFatal);
    frames.alloc(16).or_fatal(&PanicOnFatal);
}
