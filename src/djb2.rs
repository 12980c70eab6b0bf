/// Hash a group or file name the way reference tables store it.
///
/// Names are hashed as given; callers wanting case-insensitive lookups
/// lowercase first.
pub fn djb2_hash<T: AsRef<str>>(string: T) -> i32 {
    string
        .as_ref()
        .bytes()
        .fold(0i32, |hash, c| {
            (hash << 5).wrapping_sub(hash).wrapping_add(c as i32)
        })
}
