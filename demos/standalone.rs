use tagalloc::{Address, Allocator, MappedRegion};

fn print_alloc(address: Address, requested: usize, allocator: &Allocator<MappedRegion>) {
    println!("Requested {requested} bytes of memory");
    println!(
        "Received this address: {address} (block of {} bytes)",
        allocator.block_size(address).unwrap()
    );
}

fn main() {
    let region = MappedRegion::reserve(1 << 20).unwrap();
    let mut allocator = Allocator::with_store(region);
    allocator.initialize().unwrap();

    let addr1 = allocator.allocate(1).unwrap().unwrap();
    print_alloc(addr1, 1, &allocator);

    let addr2 = allocator.allocate(1024).unwrap().unwrap();
    print_alloc(addr2, 1024, &allocator);

    let addr3 = allocator.allocate(4096).unwrap().unwrap();
    print_alloc(addr3, 4096, &allocator);

    allocator.payload_mut(addr2).unwrap()[..5].copy_from_slice(b"hello");

    let addr2 = allocator.reallocate(Some(addr2), 2048).unwrap().unwrap();
    println!(
        "Reallocated to {addr2}, contents survived: {:?}",
        &allocator.payload(addr2).unwrap()[..5]
    );

    allocator.free(Some(addr1)).unwrap();
    allocator.free(Some(addr2)).unwrap();
    allocator.free(Some(addr3)).unwrap();

    println!("{:#?}", allocator.stats().unwrap());
    println!("Heap consistent: {}", allocator.check());
}
