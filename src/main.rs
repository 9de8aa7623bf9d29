fn main() {
    clapsense::run();
}
