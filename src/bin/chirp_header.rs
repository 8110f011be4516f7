use sonar_lib::waveform::BinaryChirp;

// Prints the transmitter lookup table header for the default two-level chirp.
fn main() {
    print!("{}", BinaryChirp::default().lookup_table_header());
}
