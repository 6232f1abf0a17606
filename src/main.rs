fn main() {
    divided_edges::run();
}
