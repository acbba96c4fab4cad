fn main() {
    taclet::bin::cli()
}
