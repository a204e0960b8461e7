//! Key-to-partition routing compatible with the Java client's default partitioner.

/// Kafka's murmur2 hash as implemented by the Java client.
pub fn murmur2(data: &[u8]) -> u32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let len = data.len();
    let mut h: u32 = SEED ^ (len as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Picks the partition for a key; equal keys always map to the same partition.
pub fn partition_for_key(key: &[u8], partition_count: usize) -> i32 {
    if partition_count == 0 {
        return 0;
    }
    let positive = murmur2(key) & 0x7fff_ffff;
    (positive % partition_count as u32) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur2_matches_java_client() {
        // Reference values from org.apache.kafka.common.utils.Utils.murmur2.
        assert_eq!(murmur2(b"21") as i32, -973932308);
        assert_eq!(murmur2(b"foobar") as i32, -790332482);
        assert_eq!(murmur2(b"a-little-bit-long-string") as i32, -985981536);
        assert_eq!(murmur2(b"a-little-bit-longer-string") as i32, -1486304829);
        assert_eq!(murmur2(b"abc") as i32, 479470107);
    }

    #[test]
    fn test_same_key_same_partition() {
        let key = b"9f1c2f0e-6a3d-4c55-8b0e-1f2d3c4b5a69";
        let first = partition_for_key(key, 6);
        for _ in 0..10 {
            assert_eq!(partition_for_key(key, 6), first);
        }
        assert!((0..6).contains(&first));
    }

    #[test]
    fn test_zero_partitions_routes_to_zero() {
        assert_eq!(partition_for_key(b"anything", 0), 0);
    }
}
