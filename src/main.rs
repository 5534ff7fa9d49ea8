fn main() {
    infosage_lib::run()
}
