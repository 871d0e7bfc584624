//! Drives a [`Heap`] by hand: a few allocations, a free, and a reuse check.

use mmalloc::Heap;

fn main() {
    let mut heap = Heap::new();

    unsafe {
        let a = heap.allocate(8).unwrap();
        println!("Requested 8 bytes, received {:?}", a);

        let b = heap.allocate(100).unwrap();
        println!("Requested 100 bytes, received {:?}", b);

        let c = heap.allocate_zeroed(16).unwrap();
        println!("Requested 16 zeroed bytes, received {:?}", c);

        println!("Freeing the first allocation");
        heap.free(a);

        // Best fit hands the freed block back for an equal request.
        let d = heap.allocate(8).unwrap();
        println!("Requested 8 bytes again, received {:?}", d);
        assert_eq!(a, d);

        let e = heap.reallocate(b, 200).unwrap();
        println!("Moved the 100 byte allocation to 200 bytes at {:?}", e);

        heap.free(d);
        heap.free(c);
        heap.free(e);
    }
}
